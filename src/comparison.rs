use std::cmp::Ordering;

use serde_json::Value;

/// Orders two values of compatible type. Numbers compare numerically, a
/// numeric string compares with a number as a number. Anything else is
/// incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => Some(sa.cmp(sb)),
        (Value::Number(na), Value::Number(nb)) => {
            if let (Some(ia), Some(ib)) = (na.as_i64(), nb.as_i64()) {
                return Some(ia.cmp(&ib));
            }
            na.as_f64()?.partial_cmp(&nb.as_f64()?)
        }
        (Value::Bool(ba), Value::Bool(bb)) => Some(ba.cmp(bb)),
        (Value::Number(na), Value::String(sb)) => {
            na.as_f64()?.partial_cmp(&sb.parse::<f64>().ok()?)
        }
        (Value::String(sa), Value::Number(nb)) => {
            sa.parse::<f64>().ok()?.partial_cmp(&nb.as_f64()?)
        }
        _ => None,
    }
}

/// Equality that treats `1` and `1.0` alike.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}
