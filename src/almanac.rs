use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};

// Gemini South, Cerro Pachón.
const SITE_LATITUDE: f64 = -(30.0 + 14.0 / 60.0 + 26.7 / 3600.0);
const SITE_LONGITUDE: f64 = -(70.0 + 44.0 / 60.0 + 12.006 / 3600.0);
const SITE_NAME: &str = "Gemini South";

const SUN_HORIZON_DEG: f64 = -0.833;
const TWILIGHT_DEG: f64 = -12.0;

const SYNODIC_MONTH_DAYS: f64 = 29.530588853;
// New moon of 2000-01-06 18:14 UTC.
const REFERENCE_NEW_MOON_UNIX: i64 = 947_182_440;

const MOON_PHASES: [&str; 8] = [
    "new",
    "waxing crescent",
    "first quarter",
    "waxing gibbous",
    "full",
    "waning gibbous",
    "last quarter",
    "waning crescent",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Zone {
    pub(super) label: String,
    pub(super) offset: FixedOffset,
}

fn fixed_zone(label: impl Into<String>, hours: i32) -> Option<Zone> {
    Some(Zone {
        label: label.into(),
        offset: FixedOffset::east_opt(hours * 3600)?,
    })
}

fn utc_at(date: Option<NaiveDate>, hour: u32) -> Option<DateTime<Utc>> {
    Some(date?.and_hms_opt(hour, 0, 0)?.and_utc())
}

/// US daylight time: second Sunday of March to first Sunday of November.
fn us_daylight_time(at: DateTime<Utc>) -> bool {
    let year = at.year();
    let start = utc_at(NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2), 7);
    let end = utc_at(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1), 6);
    match (start, end) {
        (Some(start), Some(end)) => at >= start && at < end,
        _ => false,
    }
}

/// Chilean summer time: first Sunday of September to first Sunday of April.
fn chile_summer_time(at: DateTime<Utc>) -> bool {
    let year = at.year();
    let end = utc_at(NaiveDate::from_weekday_of_month_opt(year, 4, Weekday::Sun, 1), 3);
    let start = utc_at(NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Sun, 1), 4);
    match (start, end) {
        (Some(start), Some(end)) => at < end || at >= start,
        _ => false,
    }
}

/// Resolves a zone abbreviation. Daylight and standard spellings are swapped
/// to whichever is in effect at `at`, so `PDT` in January gives `PST`.
pub(super) fn resolve_zone(abbrev: &str, at: DateTime<Utc>) -> Option<Zone> {
    let upper = abbrev.trim().to_ascii_uppercase();
    match upper.as_str() {
        "UTC" | "UT" | "GMT" | "Z" => return fixed_zone("UTC", 0),
        "HST" => return fixed_zone("HST", -10),
        "CLT" | "CLST" | "CHILE" => {
            return if chile_summer_time(at) {
                fixed_zone("CLST", -3)
            } else {
                fixed_zone("CLT", -4)
            };
        }
        _ => {}
    }

    let stem = upper
        .strip_suffix("ST")
        .or_else(|| upper.strip_suffix("DT"))?;
    let standard = match stem {
        "E" => -5,
        "C" => -6,
        "M" => -7,
        "P" => -8,
        "AK" => -9,
        _ => return None,
    };
    if us_daylight_time(at) {
        fixed_zone(format!("{}DT", stem), standard + 1)
    } else {
        fixed_zone(format!("{}ST", stem), standard)
    }
}

fn favorite_zones(at: DateTime<Utc>) -> Vec<Zone> {
    let mut zones = Vec::new();
    if let Some(chile) = resolve_zone("CLT", at) {
        zones.push(Zone {
            label: "Chile".to_string(),
            ..chile
        });
    }
    zones.extend(resolve_zone("EST", at));
    zones.extend(resolve_zone("PST", at));
    zones
}

fn clock(at: DateTime<Utc>, offset: &FixedOffset) -> String {
    let text = at.with_timezone(offset).format("%I:%M %p").to_string();
    match text.strip_prefix('0') {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

/// `at` in Chile, US Eastern and US Pacific time, e.g.
/// `9:30 PM Chile, 8:30 PM EDT, 5:30 PM PDT`.
pub(super) fn multizone(at: DateTime<Utc>) -> String {
    favorite_zones(at)
        .iter()
        .map(|zone| format!("{} {}", clock(at, &zone.offset), zone.label))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) fn time_response(zone_text: &str, now: DateTime<Utc>) -> String {
    let zone_text = zone_text.trim();
    if zone_text.is_empty() {
        return format!("It is {}", multizone(now));
    }
    match resolve_zone(zone_text, now) {
        Some(zone) => format!(
            "It is {} in {}",
            now.with_timezone(&zone.offset).format("%I:%M %p (UT%z)"),
            zone.label
        ),
        None => format!("I don't know the time zone {}.", zone_text),
    }
}

/// Sunrise equation for the site on `date`, with the sun's center at
/// `altitude_deg`. `None` when the sun never crosses that altitude.
fn sun_event(date: NaiveDate, altitude_deg: f64, rising: bool) -> Option<DateTime<Utc>> {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)?;
    let day = (date - epoch).num_days() as f64 + 0.0008;
    let mean_noon = day - SITE_LONGITUDE / 360.0;

    let anomaly_deg = (357.5291 + 0.985_600_28 * mean_noon).rem_euclid(360.0);
    let anomaly = anomaly_deg.to_radians();
    let center = 1.9148 * anomaly.sin() + 0.0200 * (2.0 * anomaly).sin() + 0.0003 * (3.0 * anomaly).sin();
    let ecliptic = (anomaly_deg + center + 180.0 + 102.9372)
        .rem_euclid(360.0)
        .to_radians();
    let transit = 2_451_545.0 + mean_noon + 0.0053 * anomaly.sin() - 0.0069 * (2.0 * ecliptic).sin();

    let declination = (ecliptic.sin() * 23.4397_f64.to_radians().sin()).asin();
    let latitude = SITE_LATITUDE.to_radians();
    let cos_hour_angle = (altitude_deg.to_radians().sin() - latitude.sin() * declination.sin())
        / (latitude.cos() * declination.cos());
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let hour_angle = cos_hour_angle.acos().to_degrees() / 360.0;
    let julian = if rising {
        transit - hour_angle
    } else {
        transit + hour_angle
    };
    let seconds = ((julian - 2_440_587.5) * 86_400.0).round() as i64;
    DateTime::from_timestamp(seconds, 0)
}

pub(super) fn next_sun_event(now: DateTime<Utc>, altitude_deg: f64, rising: bool) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    (-1..=2)
        .filter_map(|offset| today.checked_add_signed(chrono::Duration::days(offset)))
        .filter_map(|date| sun_event(date, altitude_deg, rising))
        .filter(|event| *event > now)
        .min()
}

fn sun_response(now: DateTime<Utc>, rising: bool) -> String {
    let word = if rising { "sunrise" } else { "sunset" };
    match (
        next_sun_event(now, SUN_HORIZON_DEG, rising),
        next_sun_event(now, TWILIGHT_DEG, rising),
    ) {
        (Some(event), Some(twilight)) => format!(
            "Next {} at {} is {}\nand 12 deg twilight is at {}",
            word,
            SITE_NAME,
            multizone(event),
            multizone(twilight)
        ),
        _ => format!("I couldn't work out the next {} at {}.", word, SITE_NAME),
    }
}

pub(super) fn sunrise_response(now: DateTime<Utc>) -> String {
    sun_response(now, true)
}

pub(super) fn sunset_response(now: DateTime<Utc>) -> String {
    sun_response(now, false)
}

/// Days since the last new moon.
pub(super) fn moon_age(now: DateTime<Utc>) -> f64 {
    let days = (now.timestamp() - REFERENCE_NEW_MOON_UNIX) as f64 / 86_400.0;
    days.rem_euclid(SYNODIC_MONTH_DAYS)
}

pub(super) fn moon_phase_name(age: f64) -> &'static str {
    let eighth = SYNODIC_MONTH_DAYS / 8.0;
    let index = ((age + eighth / 2.0) / eighth).floor() as usize % MOON_PHASES.len();
    MOON_PHASES[index]
}

pub(super) fn moon_response(now: DateTime<Utc>) -> String {
    let age = moon_age(now);
    let illuminated = (1.0 - (std::f64::consts::TAU * age / SYNODIC_MONTH_DAYS).cos()) / 2.0;
    format!(
        "The moon is {} ({:.0}% illuminated, {:.1} days old).",
        moon_phase_name(age),
        illuminated * 100.0,
        age
    )
}
