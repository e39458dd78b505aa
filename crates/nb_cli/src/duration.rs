use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SECONDS_PER_HOUR: u64 = 3600;

/// A schedule interval such as `1h`, `30m`, `1d` or `1h15m30s`. A plain
/// number on its own counts hours, so `SCHEDULE_INTERVAL=1` means hourly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(SECONDS_PER_HOUR),
        'd' => Some(24 * SECONDS_PER_HOUR),
        _ => None,
    }
}

fn too_long(input: &str) -> String {
    format!("Duration is too long: {}", input)
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let input: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if input.is_empty() {
            return Err("Duration must not be empty".to_string());
        }

        let total = if input.chars().all(|c| c.is_ascii_digit()) {
            input
                .parse::<u64>()
                .ok()
                .and_then(|hours| hours.checked_mul(SECONDS_PER_HOUR))
                .ok_or_else(|| too_long(s))?
        } else {
            let mut total = 0u64;
            let mut rest = input.as_str();
            while !rest.is_empty() {
                let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                if digits == 0 {
                    let found = rest.chars().next().unwrap_or_default();
                    return Err(format!("Expected a number before '{}'", found));
                }
                let (number, tail) = rest.split_at(digits);
                let mut chars = tail.chars();
                let unit = chars
                    .next()
                    .ok_or_else(|| format!("Missing unit after {} in '{}'", number, s))?;
                let per_unit = unit_seconds(unit)
                    .ok_or_else(|| format!("Invalid duration unit: {}", unit))?;

                total = number
                    .parse::<u64>()
                    .ok()
                    .and_then(|n| n.checked_mul(per_unit))
                    .and_then(|part| total.checked_add(part))
                    .ok_or_else(|| too_long(s))?;
                rest = chars.as_str();
            }
            total
        };

        if total == 0 {
            return Err("Duration must be positive".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            write!(f, "{}h", h)?;
        }
        if m > 0 {
            write!(f, "{}m", m)?;
        }
        if s > 0 || secs == 0 {
            write!(f, "{}s", s)?;
        }
        Ok(())
    }
}
