use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A date/time as an adapter saw it: a machine-readable ISO hint, free text, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDateTime {
    pub iso: Option<String>,
    pub text: Option<String>,
}

impl RawDateTime {
    pub fn iso(value: impl Into<String>) -> Self {
        Self {
            iso: Some(value.into()),
            text: None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            iso: None,
            text: Some(value.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        blank(self.iso.as_deref()) && blank(self.text.as_deref())
    }
}

fn blank(s: Option<&str>) -> bool {
    s.map_or(true, |v| v.trim().is_empty())
}

/// Adapter output, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Identifier the source itself uses (feed UID, API id).
    pub source_event_id: Option<String>,
    pub raw_start: Option<RawDateTime>,
    pub raw_end: Option<RawDateTime>,
    pub raw_location: String,
    pub raw_description: Option<String>,
}

impl RawCandidate {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn has_start(&self) -> bool {
        self.raw_start.as_ref().map_or(false, |s| !s.is_empty())
    }

    /// Needs a title or a start to be worth normalizing.
    pub fn is_eligible(&self) -> bool {
        !self.title.trim().is_empty() || self.has_start()
    }
}

/// Canonical event. `start` is only absent for pending events awaiting enrichment;
/// nothing without a start ever reaches the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub source_id: String,
    pub title: String,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    /// False when `end` was synthesized from a default duration.
    #[serde(default)]
    pub end_explicit: bool,
    pub all_day: bool,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    #[serde(default)]
    pub stable_id: String,
}

impl NormalizedEvent {
    pub fn is_pending(&self) -> bool {
        self.start.is_none()
    }

    /// Fill a missing end from the default duration and clamp an end that does not
    /// come after start. Never rejects. A clamped end counts as synthesized.
    pub fn ensure_end(&mut self, default_duration: Duration) {
        let Some(start) = self.start else {
            return;
        };
        let fallback = if self.all_day {
            start + Duration::days(1)
        } else {
            start + default_duration
        };
        match self.end {
            None => {
                self.end = Some(fallback);
                self.end_explicit = false;
            }
            Some(end) if end <= start => {
                self.end = Some(fallback);
                self.end_explicit = false;
            }
            Some(_) => {}
        }
    }

    pub fn refresh_stable_id(&mut self) {
        let local_id = self
            .source_event_id
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or(self.title.as_str());
        self.stable_id = stable_id(&self.source_id, local_id, self.start);
    }
}

/// Deterministic key for the same event from the same source across runs.
pub fn stable_id(source_id: &str, local_id: &str, start: Option<DateTime<FixedOffset>>) -> String {
    let start_utc = start
        .map(|s| {
            s.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        })
        .unwrap_or_default();

    let mut s = String::new();
    s.push_str(source_id.trim());
    s.push('|');
    s.push_str(local_id.trim());
    s.push('|');
    s.push_str(&start_utc);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    hex::encode(&out[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn central(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
    }

    fn event() -> NormalizedEvent {
        NormalizedEvent {
            source_id: "vilas".to_string(),
            title: "Fish Fry".to_string(),
            start: Some(central(2025, 7, 4, 17)),
            end: None,
            end_explicit: false,
            all_day: false,
            location: String::new(),
            url: None,
            description: None,
            source_event_id: Some("uid-1".to_string()),
            stable_id: String::new(),
        }
    }

    #[test]
    fn test_stable_id_uses_utc_instant() {
        let a = stable_id("vilas", "uid-1", Some(central(2025, 7, 4, 17)));
        let same_instant = central(2025, 7, 4, 17).with_timezone(&FixedOffset::east_opt(0).unwrap());
        let b = stable_id("vilas", "uid-1", Some(same_instant));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, stable_id("vilas", "uid-2", Some(central(2025, 7, 4, 17))));
    }

    #[test]
    fn test_ensure_end_defaults_and_clamps() {
        let mut ev = event();
        ev.ensure_end(Duration::minutes(60));
        assert_eq!(ev.end, Some(central(2025, 7, 4, 18)));
        assert!(!ev.end_explicit);

        let mut backwards = event();
        backwards.end = Some(central(2025, 7, 4, 15));
        backwards.end_explicit = true;
        backwards.ensure_end(Duration::minutes(60));
        assert_eq!(backwards.end, Some(central(2025, 7, 4, 18)));
        assert!(!backwards.end_explicit);
    }

    #[test]
    fn test_ensure_end_all_day_is_one_day() {
        let mut ev = event();
        ev.all_day = true;
        ev.start = Some(central(2025, 7, 4, 0));
        ev.ensure_end(Duration::minutes(60));
        assert_eq!(ev.end, Some(central(2025, 7, 5, 0)));
    }

    #[test]
    fn test_candidate_eligibility() {
        let mut c = RawCandidate::new("s", "  ");
        assert!(!c.is_eligible());
        c.raw_start = Some(RawDateTime::text("July 4, 2025"));
        assert!(c.is_eligible());
        assert!(RawCandidate::new("s", "Parade").is_eligible());
    }
}
