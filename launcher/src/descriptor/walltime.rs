use super::LaunchError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// Wall-clock limit of a job, with whole second precision.
///
/// Parses `H:MM:SS`, `MM:SS` or plain seconds and displays as `H:MM:SS`
/// without padding the hours, which is what PBS and Slurm both accept.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "WalltimeRepr", into = "String")]
pub struct Walltime(Duration);

#[derive(Deserialize)]
#[serde(untagged)]
enum WalltimeRepr {
    Seconds(u64),
    Text(String),
}

impl Walltime {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn from_hms(hours: u64, minutes: u64, seconds: u64) -> Self {
        // saturates at u64::MAX seconds
        Self::from_secs(
            hours
                .saturating_mul(3600)
                .saturating_add(minutes.saturating_mul(60))
                .saturating_add(seconds),
        )
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Duration> for Walltime {
    fn from(duration: Duration) -> Self {
        Self::from_secs(duration.as_secs())
    }
}

impl FromStr for Walltime {
    type Err = LaunchError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || LaunchError::InvalidWalltime(input.to_owned());
        let trimmed = input.trim();

        let parts: Vec<&str> = trimmed.split(':').collect();
        if trimmed.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }

        let mut values = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(invalid());
            }
            values.push(part.parse::<u64>().map_err(|_| invalid())?);
        }

        // only the leading unit may overflow into the next one
        if values.iter().skip(1).any(|value| *value >= 60) {
            return Err(invalid());
        }

        values
            .iter()
            .try_fold(0u64, |acc, value| acc.checked_mul(60)?.checked_add(*value))
            .map(Self::from_secs)
            .ok_or_else(invalid)
    }
}

impl TryFrom<WalltimeRepr> for Walltime {
    type Error = LaunchError;

    fn try_from(repr: WalltimeRepr) -> Result<Self, Self::Error> {
        match repr {
            WalltimeRepr::Seconds(secs) => Ok(Self::from_secs(secs)),
            WalltimeRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Walltime> for String {
    fn from(walltime: Walltime) -> Self {
        walltime.to_string()
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.as_secs();

        write!(f, "{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
