use super::domain::ApartmentCategory;

/// Map free-text waitlist descriptions onto the 0..=99 availability scale,
/// lower = sooner. Anything unparseable lands on 99 ("unconfirmed/long").
pub fn availability_score_for(waitlist: &str) -> u8 {
    let normalized = waitlist.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return 99;
    }

    if normalized.contains("available") && !normalized.contains("not available") {
        return 0;
    }

    if normalized.starts_with('<') || normalized.contains("less than 1") {
        return 15;
    }

    match month_upper_bound(&normalized) {
        Some(months) if months <= 1 => 15,
        Some(months) if months <= 3 => 45,
        Some(months) if months <= 6 => 75,
        _ => 99,
    }
}

/// Pull the largest whole number of months out of phrases like
/// "1-3 months" or "about 2 months".
fn month_upper_bound(normalized: &str) -> Option<u32> {
    if !normalized.contains("month") {
        return None;
    }

    normalized
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.parse::<u32>().ok())
        .max()
}

/// Placement partners get full willingness credit; everyone else none.
pub fn willingness_score_for(works_with_placement: bool) -> u8 {
    if works_with_placement {
        10
    } else {
        0
    }
}

/// Keyword rules collapsing unit descriptions into the closed tag set.
pub fn apartment_category_for(raw: Option<&str>) -> ApartmentCategory {
    let Some(raw) = raw else {
        return ApartmentCategory::Unknown;
    };
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return ApartmentCategory::Unknown;
    }

    if normalized.contains("studio") || normalized.contains("efficiency") {
        ApartmentCategory::Studio
    } else if normalized.contains("2 bed")
        || normalized.contains("2br")
        || normalized.contains("two bed")
    {
        ApartmentCategory::TwoBedroom
    } else if normalized.contains("1 bed")
        || normalized.contains("1br")
        || normalized.contains("one bed")
    {
        ApartmentCategory::OneBedroom
    } else if normalized.contains("double")
        || normalized.contains("shared")
        || normalized.contains("companion")
    {
        ApartmentCategory::DoubleOccupancy
    } else {
        ApartmentCategory::Unknown
    }
}
