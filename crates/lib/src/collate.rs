//! Order-preserving key encoding for emitted view rows.
//!
//! [`to_indexable`] turns a JSON value into a string whose byte order matches
//! a total order over values:
//!
//! `null < false < true < numbers < strings < arrays < objects`
//!
//! Numbers order numerically, strings by their UTF-8 bytes, arrays and objects
//! element by element with shorter prefixes first. Objects compare by their
//! key-sorted entries. The encoding is one-way.
//!
//! ```rust
//! use canopy::collate::to_indexable;
//! use serde_json::json;
//!
//! assert!(to_indexable(&json!(-3)) < to_indexable(&json!(0.5)));
//! assert!(to_indexable(&json!(9)) < to_indexable(&json!(10)));
//! assert!(to_indexable(&json!("zzz")) < to_indexable(&json!([0])));
//! ```

use serde_json::Value;

const NULL: char = '1';
const BOOL: char = '2';
const NUMBER: char = '3';
const STRING: char = '4';
const ARRAY: char = '5';
const OBJECT: char = '6';

/// Ends strings, arrays, objects and positive mantissas.
const END: char = '\0';
const ESCAPE: char = '\u{1}';
/// Ends negative mantissas; sorts above every complemented digit.
const NEGATIVE_END: char = '~';

/// Exponent bias so the smallest subnormal exponent maps to zero.
const EXPONENT_BIAS: i32 = 324;

/// Encode a value as an order-preserving key.
pub fn to_indexable(value: &Value) -> String {
    let mut out = String::new();
    encode(value, &mut out);
    out
}

fn encode(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push(NULL),
        Value::Bool(b) => {
            out.push(BOOL);
            out.push(if *b { '1' } else { '0' });
        }
        Value::Number(n) => {
            out.push(NUMBER);
            encode_number(n.as_f64().unwrap_or(0.0), out);
        }
        Value::String(s) => encode_string(s, out),
        Value::Array(items) => {
            out.push(ARRAY);
            for item in items {
                encode(item, out);
            }
            out.push(END);
        }
        Value::Object(object) => {
            out.push(OBJECT);
            let mut entries: Vec<_> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                encode_string(key, out);
                encode(item, out);
            }
            out.push(END);
        }
    }
}

fn encode_string(s: &str, out: &mut String) {
    out.push(STRING);
    for c in s.chars() {
        match c {
            END => {
                out.push(ESCAPE);
                out.push('\u{1}');
            }
            ESCAPE => {
                out.push(ESCAPE);
                out.push('\u{2}');
            }
            c => out.push(c),
        }
    }
    out.push(END);
}

/// Sign class, then a 3-digit biased exponent, then the significant digits.
///
/// Negative numbers complement the exponent and every digit so larger
/// magnitudes sort first.
fn encode_number(n: f64, out: &mut String) {
    if n == 0.0 || !n.is_finite() {
        out.push('1');
        return;
    }

    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0) + EXPONENT_BIAS;
    let digits = mantissa.chars().filter(char::is_ascii_digit);

    if n > 0.0 {
        out.push('2');
        out.push_str(&format!("{exponent:03}"));
        out.extend(digits);
        out.push(END);
    } else {
        out.push('0');
        out.push_str(&format!("{:03}", 999 - exponent));
        out.extend(digits.map(|d| (b'9' - (d as u8 - b'0')) as char));
        out.push(NEGATIVE_END);
    }
}
