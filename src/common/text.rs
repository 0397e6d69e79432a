use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// Collapse all whitespace runs to single spaces and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn clean_opt(s: Option<&str>) -> Option<String> {
    s.map(clean_text).filter(|v| !v.is_empty())
}

/// Remove markup and decode the handful of entities small CMS sites actually emit.
pub fn strip_html(s: &str) -> String {
    let without_tags = TAG_RE.replace_all(s, " ");
    clean_text(&decode_entities(&without_tags))
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#8211;", "–")
        .replace("&#8217;", "'")
        .replace("&#8220;", "\"")
        .replace("&#8221;", "\"")
        .replace("&#038;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Lower-case, collapse every non-alphanumeric run to one space, trim.
pub fn normalize_title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Lower-case and collapse whitespace.
pub fn normalize_place(s: &str) -> String {
    clean_text(&s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_collapses_punctuation() {
        assert_eq!(normalize_title("farmers   market!!"), "farmers market");
        assert_eq!(normalize_title("Farmers Market"), "farmers market");
        assert_eq!(normalize_title("  --Fish_Fry @ The Lodge-- "), "fish fry the lodge");
        assert_eq!(normalize_title("Café Night"), "café night");
    }

    #[test]
    fn test_normalize_place() {
        assert_eq!(normalize_place("  Minocqua \n Town   Park "), "minocqua town park");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Bring a chair &amp; a <b>blanket</b></p>\n<p>Free</p>"),
            "Bring a chair & a blanket Free"
        );
    }

    #[test]
    fn test_clean_opt_drops_blank() {
        assert_eq!(clean_opt(Some("   ")), None);
        assert_eq!(clean_opt(Some(" a  b ")), Some("a b".to_string()));
        assert_eq!(clean_opt(None), None);
    }
}
