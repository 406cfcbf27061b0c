//! # Payload codec helpers
//!
//! All payloads on the operator link are whitespace delimited token lists with a fixed number of
//! tokens per topic. These helpers do the splitting and the per-token parsing, so the message
//! types in `tc` and `tm` only describe their own layout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Expected {expected} tokens but found {found}")]
    WrongArity {
        expected: String,
        found: usize
    },

    #[error("Token {0:?} is not a valid number")]
    NotANumber(String),

    #[error("Token {0:?} is not a valid boolean")]
    NotABool(String),

    #[error("Unrecognised mode {0:?}")]
    UnknownMode(String),

    #[error("Token {0:?} is out of range")]
    OutOfRange(String),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Split a payload into exactly `n` tokens.
pub fn tokens_exact(payload: &str, n: usize) -> Result<Vec<&str>, DecodeError> {
    tokens_between(payload, n, n)
}

/// Split a payload into between `min` and `max` tokens (inclusive).
pub fn tokens_between(payload: &str, min: usize, max: usize) -> Result<Vec<&str>, DecodeError> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();

    if tokens.len() < min || tokens.len() > max {
        let expected = match min == max {
            true => format!("{}", min),
            false => format!("{} to {}", min, max)
        };

        return Err(DecodeError::WrongArity {
            expected,
            found: tokens.len()
        })
    }

    Ok(tokens)
}

/// Parse an integer token.
pub fn parse_int<T: FromStr>(token: &str) -> Result<T, DecodeError> {
    token.parse().map_err(|_| DecodeError::NotANumber(token.to_string()))
}

/// Parse a float token. Non-finite values (`NaN`, `inf`) are rejected.
pub fn parse_float(token: &str) -> Result<f64, DecodeError> {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::NotANumber(token.to_string()))
    }
}

/// Parse a `T`/`F` flag token.
pub fn parse_flag(token: &str) -> Result<bool, DecodeError> {
    match token {
        "T" => Ok(true),
        "F" => Ok(false),
        _ => Err(DecodeError::NotABool(token.to_string()))
    }
}

/// Encode a flag as `T` or `F`.
pub fn flag_str(flag: bool) -> &'static str {
    match flag {
        true => "T",
        false => "F"
    }
}

/// Parse a `True`/`False` token, case insensitive.
pub fn parse_bool(token: &str) -> Result<bool, DecodeError> {
    match token.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        _ => Err(DecodeError::NotABool(token.to_string()))
    }
}

/// Encode a bool as `True` or `False`, the spelling the drive station expects.
pub fn bool_str(b: bool) -> &'static str {
    match b {
        true => "True",
        false => "False"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tokens_arity() {
        assert_eq!(tokens_exact("  a  b\tc ", 3).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            tokens_exact("a b", 3),
            Err(DecodeError::WrongArity { expected: "3".into(), found: 2 })
        );
        assert_eq!(
            tokens_between("a b c d e", 3, 4),
            Err(DecodeError::WrongArity { expected: "3 to 4".into(), found: 5 })
        );
        assert!(tokens_between("a b c d", 3, 4).is_ok());
    }

    #[test]
    fn test_parse_float_rejects_non_finite() {
        assert_eq!(parse_float("1.5"), Ok(1.5));
        assert!(parse_float("NaN").is_err());
        assert!(parse_float("inf").is_err());
        assert!(parse_float("one").is_err());
    }

    #[test]
    fn test_bools() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool(bool_str(false)), Ok(false));
        assert!(parse_flag("t").is_err());
        assert_eq!(parse_flag(flag_str(true)), Ok(true));
    }
}
