/// Adapter kind names as they appear in the source configuration.
pub const ICS_KIND: &str = "ics";
pub const ICS_AUTO_KIND: &str = "ics_auto";
pub const JSONLD_PAGE_KIND: &str = "jsonld_page";
pub const HTML_JSONLD_KIND: &str = "html_jsonld";
pub const TEC_REST_KIND: &str = "tec_rest";
pub const ICS_OR_HTML_KIND: &str = "ics_or_html";
pub const RSS_JSONLD_KIND: &str = "rss_jsonld";

/// Get all supported adapter kinds
pub fn get_supported_kinds() -> Vec<&'static str> {
    vec![
        ICS_KIND,
        ICS_AUTO_KIND,
        JSONLD_PAGE_KIND,
        HTML_JSONLD_KIND,
        TEC_REST_KIND,
        ICS_OR_HTML_KIND,
        RSS_JSONLD_KIND,
    ]
}

pub const DEFAULT_TIMEZONE: &str = "America/Chicago";
pub const DEFAULT_CALENDAR_NAME: &str = "Northwoods Events";
pub const PRODID: &str = "-//Northwoods Events//EN";
pub const UID_DOMAIN: &str = "northwoods-events";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; NorthwoodsEventsBot/1.0; +https://github.com/dsundt/northwoods-events)";

pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Dateless listings resolving further than this into the past roll forward a year.
/// Tunable heuristic, not a contract.
pub const YEAR_ROLLOVER_THRESHOLD_DAYS: i64 = 300;

/// Descriptions longer than this count toward the dedup completeness score.
pub const RICH_DESCRIPTION_CHARS: usize = 80;

pub const DEFAULT_LOG_TAIL: usize = 500;
