//! Integer expression evaluation for `#if` / `#elif`
//!
//! Operates on text where `defined` has already been resolved and macros have
//! been expanded. Remaining identifiers evaluate to 0, as in C.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(i64),
    Ident,
    Op(&'static str),
    LParen,
    RParen,
}

const OPERATORS: [&str; 22] = [
    "||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "|", "^", "&", "<", ">", "+", "-", "*", "/",
    "%", "!", "~", "(", ")",
];

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                i += 1;
            }
            tokens.push(Token::Num(parse_int(&expr[start..i])?));
        } else if b.is_ascii_alphabetic() || b == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident);
        } else {
            let op = OPERATORS
                .iter()
                .find(|op| expr[i..].starts_with(**op))
                .ok_or_else(|| format!("Unexpected character '{}' in expression", &expr[i..].chars().next().unwrap_or('?')))?;
            i += op.len();
            tokens.push(match *op {
                "(" => Token::LParen,
                ")" => Token::RParen,
                other => Token::Op(other),
            });
        }
    }

    Ok(tokens)
}

fn parse_int(literal: &str) -> Result<i64, String> {
    let digits = literal.trim_end_matches(['u', 'U']);
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<i64>()
    };
    parsed.map_err(|_| format!("Invalid integer literal '{}'", literal))
}

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | ">" | "<=" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<i64, String> {
        let mut lhs = self.parse_unary()?;

        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            let prec = match binary_precedence(op) {
                Some(p) if p >= min_prec => p,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_expr(prec + 1)?;
            lhs = apply_binary(op, lhs, rhs)?;
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<i64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Ident) => Ok(0),
            Some(Token::LParen) => {
                let value = self.parse_expr(1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("Missing ')' in expression".to_string()),
                }
            }
            Some(Token::Op("!")) => Ok((self.parse_unary()? == 0) as i64),
            Some(Token::Op("-")) => Ok(self.parse_unary()?.wrapping_neg()),
            Some(Token::Op("+")) => self.parse_unary(),
            Some(Token::Op("~")) => Ok(!self.parse_unary()?),
            Some(Token::RParen) => Err("Unexpected ')' in expression".to_string()),
            Some(Token::Op(op)) => Err(format!("Unexpected operator '{}' in expression", op)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}

fn apply_binary(op: &str, lhs: i64, rhs: i64) -> Result<i64, String> {
    Ok(match op {
        "||" => ((lhs != 0) || (rhs != 0)) as i64,
        "&&" => ((lhs != 0) && (rhs != 0)) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.wrapping_shl(rhs as u32),
        ">>" => lhs.wrapping_shr(rhs as u32),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" | "%" if rhs == 0 => return Err("Division by zero in expression".to_string()),
        "/" => lhs.wrapping_div(rhs),
        "%" => lhs.wrapping_rem(rhs),
        other => return Err(format!("Unsupported operator '{}'", other)),
    })
}

/// Evaluate a preprocessed `#if` expression to an integer
pub fn evaluate(expr: &str) -> Result<i64, String> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err("Empty expression".to_string());
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr(1)?;
    if parser.pos < parser.tokens.len() {
        return Err("Unexpected trailing tokens in expression".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(evaluate("1 + 2 * 3"), Ok(7));
        assert_eq!(evaluate("(1 + 2) * 3"), Ok(9));
        assert_eq!(evaluate("10 - 4 - 3"), Ok(3));
    }

    #[test]
    fn test_logical_and_comparison() {
        assert_eq!(evaluate("1 && 0 || 1"), Ok(1));
        assert_eq!(evaluate("!(2 > 3)"), Ok(1));
        assert_eq!(evaluate("300 >= 300 && 0x10 == 16"), Ok(1));
    }

    #[test]
    fn test_unknown_identifiers_are_zero() {
        assert_eq!(evaluate("UNDEFINED_THING"), Ok(0));
        assert_eq!(evaluate("!UNDEFINED_THING"), Ok(1));
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1 +").is_err());
        assert!(evaluate("(1").is_err());
        assert!(evaluate("4 / 0").is_err());
        assert!(evaluate("1 2").is_err());
    }
}
