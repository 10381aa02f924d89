use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quote currency priced in units per one base currency, e.g. `USD/EUR`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub quote: String,
    pub base: String,
}

impl CurrencyPair {
    pub fn new(quote: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            quote: quote.into().to_uppercase(),
            base: base.into().to_uppercase(),
        }
    }

    /// Column label used in the historical table and forecast files
    pub fn label(&self) -> String {
        format!("{}/{}", self.quote, self.base)
    }

    /// File-name safe form, `USD_EUR`
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.quote, self.base)
    }

    pub fn basket(base: &str, quotes: &[String]) -> Vec<CurrencyPair> {
        quotes.iter().map(|q| CurrencyPair::new(q.as_str(), base)).collect()
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.quote, self.base)
    }
}

impl FromStr for CurrencyPair {
    type Err = String;

    /// Accepts both `USD/EUR` and `USD_EUR`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(|c: char| c == '/' || c == '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(quote), Some(base), None) if is_iso_code(quote) && is_iso_code(base) => {
                Ok(CurrencyPair::new(quote, base))
            }
            _ => Err(format!("Unknown currency pair: {}", s)),
        }
    }
}

fn is_iso_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_labels() {
        let pair = CurrencyPair::new("usd", "eur");
        assert_eq!(pair.label(), "USD/EUR");
        assert_eq!(pair.file_stem(), "USD_EUR");
        assert_eq!(pair.to_string(), "USD/EUR");
    }

    #[test]
    fn test_pair_parsing() {
        assert_eq!(CurrencyPair::from_str("GBP/EUR").unwrap(), CurrencyPair::new("GBP", "EUR"));
        assert_eq!(CurrencyPair::from_str("chf_eur").unwrap(), CurrencyPair::new("CHF", "EUR"));
        assert!(CurrencyPair::from_str("USDEUR").is_err());
        assert!(CurrencyPair::from_str("US/EUR").is_err());
        assert!(CurrencyPair::from_str("USD/EUR/GBP").is_err());
    }

    #[test]
    fn test_basket_keeps_order() {
        let quotes = vec!["USD".to_string(), "AUD".to_string(), "GBP".to_string(), "CHF".to_string()];
        let labels: Vec<String> = CurrencyPair::basket("EUR", &quotes).iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["USD/EUR", "AUD/EUR", "GBP/EUR", "CHF/EUR"]);
    }
}
