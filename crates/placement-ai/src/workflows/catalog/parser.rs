use std::collections::BTreeMap;
use std::io::Read;

use super::domain::{CareLevel, Community, UpfrontCosts};
use super::normalizer::{apartment_category_for, availability_score_for, willingness_score_for};

pub(crate) const COMMUNITY_ID: &str = "CommunityID";
pub(crate) const CARE_LEVEL: &str = "Care Level";
pub(crate) const MONTHLY_FEE: &str = "Monthly Fee";
pub(crate) const ZIP: &str = "ZIP";
pub(crate) const WORK_WITH_PLACEMENT: &str = "Work with Placement?";
pub(crate) const CONTRACT_RATE: &str = "Contract Rate";
pub(crate) const EST_WAITLIST: &str = "Est. Waitlist";
pub(crate) const ENHANCED: &str = "Enhanced";
pub(crate) const ENRICHED: &str = "Enriched";
pub(crate) const DEPOSIT: &str = "Deposit";
pub(crate) const MOVE_IN_FEE: &str = "Move-In Fee";
pub(crate) const COMMUNITY_FEE: &str = "Community Fee - One Time";
pub(crate) const PET_FEE: &str = "Pet Fee";
pub(crate) const SECOND_PERSON_FEE: &str = "2nd Person Fee";
pub(crate) const APARTMENT_TYPE: &str = "Apartment Type";
pub(crate) const MSC_FEES: &str = "Msc Fees";

const KNOWN_COLUMNS: [&str; 16] = [
    COMMUNITY_ID,
    CARE_LEVEL,
    MONTHLY_FEE,
    ZIP,
    WORK_WITH_PLACEMENT,
    CONTRACT_RATE,
    EST_WAITLIST,
    ENHANCED,
    ENRICHED,
    DEPOSIT,
    MOVE_IN_FEE,
    COMMUNITY_FEE,
    PET_FEE,
    SECOND_PERSON_FEE,
    APARTMENT_TYPE,
    MSC_FEES,
];

/// A row that could not be turned into a `Community`; the store logs it
/// and moves on.
#[derive(Debug)]
pub(crate) struct RowError {
    pub(crate) line: u64,
    pub(crate) message: String,
}

pub(crate) fn parse_communities<R: Read>(
    reader: R,
) -> Result<(Vec<Community>, Vec<RowError>), csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut communities = Vec::new();
    let mut errors = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let mut cells = BTreeMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            if !value.trim().is_empty() {
                cells.insert(header.to_string(), value.trim().to_string());
            }
        }

        match community_from_cells(&cells) {
            Ok(community) => communities.push(community),
            Err(message) => errors.push(RowError { line, message }),
        }
    }

    Ok((communities, errors))
}

pub(crate) fn community_from_cells(
    cells: &BTreeMap<String, String>,
) -> Result<Community, String> {
    let community_id = cells
        .get(COMMUNITY_ID)
        .ok_or_else(|| format!("missing {COMMUNITY_ID}"))
        .and_then(|raw| {
            parse_integer(raw).ok_or_else(|| format!("unparseable {COMMUNITY_ID} '{raw}'"))
        })?;

    let care_level = cells
        .get(CARE_LEVEL)
        .ok_or_else(|| format!("missing {CARE_LEVEL}"))
        .and_then(|raw| {
            CareLevel::parse(raw).ok_or_else(|| format!("unrecognized {CARE_LEVEL} '{raw}'"))
        })?;

    let monthly_fee = cells
        .get(MONTHLY_FEE)
        .and_then(|raw| parse_money(raw))
        .ok_or_else(|| format!("missing or unparseable {MONTHLY_FEE}"))?;
    if monthly_fee < 0.0 {
        return Err(format!("negative {MONTHLY_FEE} {monthly_fee}"));
    }

    let zip_code = cells.get(ZIP).and_then(|raw| parse_zip(raw));
    let works_with_placement = cells
        .get(WORK_WITH_PLACEMENT)
        .map(|raw| parse_flag(raw))
        .unwrap_or(false);
    let contract_rate = cells
        .get(CONTRACT_RATE)
        .map(|raw| parse_rate(raw))
        .unwrap_or(0.0);
    let waitlist_status = cells.get(EST_WAITLIST).cloned().unwrap_or_default();
    let apartment_type = cells.get(APARTMENT_TYPE).cloned();

    let upfront = UpfrontCosts {
        deposit: money_or_zero(cells.get(DEPOSIT)),
        move_in_fee: money_or_zero(cells.get(MOVE_IN_FEE)),
        community_fee: money_or_zero(cells.get(COMMUNITY_FEE)),
        pet_fee: money_or_zero(cells.get(PET_FEE)),
        second_person_fee: cells.get(SECOND_PERSON_FEE).and_then(|raw| parse_money(raw)),
    };

    let extra: BTreeMap<String, String> = cells
        .iter()
        .filter(|(header, _)| !KNOWN_COLUMNS.contains(&header.as_str()))
        .map(|(header, value)| (header.clone(), value.clone()))
        .collect();

    Ok(Community {
        community_id,
        care_level,
        monthly_fee,
        availability_score: availability_score_for(&waitlist_status),
        willingness_score: willingness_score_for(works_with_placement),
        apartment_category: apartment_category_for(apartment_type.as_deref()),
        upfront,
        zip_code,
        apartment_type,
        waitlist_status,
        works_with_placement,
        contract_rate,
        enhanced: cells.get(ENHANCED).map(|raw| parse_flag(raw)).unwrap_or(false),
        enriched: cells.get(ENRICHED).map(|raw| parse_flag(raw)).unwrap_or(false),
        amenity_notes: cells.get(MSC_FEES).cloned(),
        extra,
    })
}

/// Integers exported from spreadsheets arrive as "12" or "12.0".
fn parse_integer(raw: &str) -> Option<u32> {
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_suffix(".0").unwrap_or(cleaned);
    cleaned.parse::<u32>().ok()
}

/// Strip currency punctuation and parse.
pub(crate) fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn money_or_zero(raw: Option<&String>) -> f64 {
    raw.and_then(|value| parse_money(value)).unwrap_or(0.0)
}

/// Five-digit ZIPs only; spreadsheet floats like "14526.0" are repaired.
pub(crate) fn parse_zip(raw: &str) -> Option<String> {
    let cleaned = raw.trim();
    let cleaned = cleaned.split('.').next().unwrap_or(cleaned);
    if cleaned.len() == 5 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        Some(cleaned.to_string())
    } else {
        None
    }
}

pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "y" | "1"
    )
}

/// Commission fraction in [0, 1]; accepts "0.85", "85%", and "No".
pub(crate) fn parse_rate(raw: &str) -> f64 {
    let cleaned = raw.trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("no") {
        return 0.0;
    }

    let parsed = if let Some(percent) = cleaned.strip_suffix('%') {
        percent.trim().parse::<f64>().ok().map(|value| value / 100.0)
    } else {
        cleaned.parse::<f64>().ok()
    };

    parsed.map(|rate| rate.clamp(0.0, 1.0)).unwrap_or(0.0)
}
