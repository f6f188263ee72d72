use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY", alias = "buy", alias = "Buy", alias = "b", alias = "B")]
    Buy,
    #[serde(rename = "SELL", alias = "sell", alias = "Sell", alias = "s", alias = "S")]
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Side {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "BUY" | "B" => Ok(Side::Buy),
            "SELL" | "S" => Ok(Side::Sell),
            _ => Err(ValidationError::InvalidSide(input.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_str() {
        struct TestCase {
            input: &'static str,
            expected: Option<Side>,
        }

        let cases = vec![
            TestCase { input: "BUY", expected: Some(Side::Buy) },
            TestCase { input: " sell ", expected: Some(Side::Sell) },
            TestCase { input: "b", expected: Some(Side::Buy) },
            TestCase { input: "short", expected: None },
            TestCase { input: "", expected: None },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let actual = test.input.parse::<Side>().ok();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_de_side() {
        let sides = serde_json::from_str::<Vec<Side>>(r#"["BUY", "sell", "B"]"#).unwrap();
        assert_eq!(sides, vec![Side::Buy, Side::Sell, Side::Buy]);
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), r#""SELL""#);
    }
}
