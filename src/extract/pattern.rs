use once_cell::sync::Lazy;
use regex::Regex;

/// A percentage-like numeric token, e.g. `5.2%`, `-0.4 %`.
static PERCENT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?\s*%").expect("percent token regex is valid"));

/// Matches the performance row of one fund.
///
/// A line matches when it starts with the fund name as a whole field
/// (optionally quoted), and a percentage token appears somewhere after it.
#[derive(Debug, Clone)]
pub struct FundPattern {
    name: String,
    anchor: Regex,
}

impl FundPattern {
    pub fn new(name: &str) -> Result<Self, regex::Error> {
        let name = name.trim();
        let anchor = Regex::new(&format!(r#"^\s*"?{}"?\s*,"#, regex::escape(name)))?;
        Ok(Self {
            name: name.to_string(),
            anchor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, line: &str) -> bool {
        match self.anchor.find(line) {
            Some(m) => PERCENT_TOKEN.is_match(&line[m.end()..]),
            None => false,
        }
    }
}

/// Trim whitespace and strip outer quotes.
pub fn clean_field(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Comma-split a line into cleaned fields.
pub fn split_fields(line: &str) -> Vec<String> {
    line.trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|f| clean_field(f).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_on_whole_name() {
        let shares = FundPattern::new("Shares").unwrap();
        assert!(shares.matches("Shares,9.1%,8.0%"));
        assert!(!shares.matches("Australian Shares,9.1%,8.0%"));
        assert!(!shares.matches("Shares - Indexed,9.1%"));

        let indexed = FundPattern::new("Australian Shares - Indexed").unwrap();
        assert!(indexed.matches("Australian Shares - Indexed,7.7%,N/A"));
        assert!(!FundPattern::new("Australian Shares")
            .unwrap()
            .matches("Australian Shares - Indexed,7.7%"));
    }

    #[test]
    fn needs_a_percentage_after_the_name() {
        let p = FundPattern::new("Balanced").unwrap();
        assert!(!p.matches("Balanced,Growth,Description only"));
        assert!(!p.matches("Balanced"));
        assert!(p.matches("Balanced , N/A, -1.25 %"));
        assert!(p.matches("\"Balanced\",\"5.2%\""));
    }

    #[test]
    fn names_with_regex_metacharacters() {
        let p = FundPattern::new("Cash (Plus)").unwrap();
        assert!(p.matches("Cash (Plus),1.0%"));
        assert!(!p.matches("Cash Plus,1.0%"));
    }

    #[test]
    fn fields_are_cleaned() {
        assert_eq!(
            split_fields(" \"Core Strategy\" , 5.2% ,4.1%\r\n"),
            vec!["Core Strategy", "5.2%", "4.1%"]
        );
        assert_eq!(clean_field("\"\""), "");
    }
}
