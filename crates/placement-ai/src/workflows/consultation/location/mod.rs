mod geocoder;
mod resolver;

pub use geocoder::{
    geodesic_miles, Coordinates, GeocodeError, GeocodeProvider, Geocoder, NominatimProvider,
};
pub use resolver::{LocationResolver, ResolverError};
