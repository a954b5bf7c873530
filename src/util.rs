//! Small utility helpers used across modules.

use serde_json::Value;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Renders a JSON value the way Python would print it back to the learner:
/// `None`, `True`/`False`, double-quoted strings with tabs and newlines
/// escaped, `[a, b]` lists and `{"k": v}` dicts.
pub fn to_python_repr(value: &Value) -> String {
  match value {
    Value::Null => "None".into(),
    Value::Bool(b) => if *b { "True".into() } else { "False".into() },
    Value::Number(n) => n.to_string(),
    Value::String(s) => quote(s),
    Value::Array(items) => {
      let parts: Vec<String> = items.iter().map(to_python_repr).collect();
      format!("[{}]", parts.join(", "))
    }
    Value::Object(map) => {
      let parts: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{}: {}", quote(k), to_python_repr(v)))
        .collect();
      format!("{{{}}}", parts.join(", "))
    }
  }
}

fn quote(s: &str) -> String {
  format!("\"{}\"", s.replace('\t', "\\t").replace('\n', "\\n"))
}

/// Renders a JSON value as a Python source literal for generated test code.
/// Strings are single-quoted with backslashes, quotes and control characters
/// escaped so that any input survives being embedded in the harness.
pub fn to_python_literal(value: &Value) -> String {
  match value {
    Value::Null => "None".into(),
    Value::Bool(b) => if *b { "True".into() } else { "False".into() },
    Value::Number(n) => n.to_string(),
    Value::String(s) => {
      let mut out = String::with_capacity(s.len() + 2);
      out.push('\'');
      for c in s.chars() {
        match c {
          '\\' => out.push_str("\\\\"),
          '\'' => out.push_str("\\'"),
          '\n' => out.push_str("\\n"),
          '\r' => out.push_str("\\r"),
          '\t' => out.push_str("\\t"),
          _ => out.push(c),
        }
      }
      out.push('\'');
      out
    }
    Value::Array(items) => {
      let parts: Vec<String> = items.iter().map(to_python_literal).collect();
      format!("[{}]", parts.join(", "))
    }
    Value::Object(map) => {
      let parts: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{}: {}", to_python_literal(&Value::String(k.clone())), to_python_literal(v)))
        .collect();
      format!("{{{}}}", parts.join(", "))
    }
  }
}

/// Structural equality with Python number semantics: `2` equals `2.0`.
/// Integers compare exactly; anything involving a float compares as f64.
pub fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
      (Some(i), Some(j)) => i == j,
      _ => match (x.as_u64(), y.as_u64()) {
        (Some(i), Some(j)) => i == j,
        _ => x.as_f64() == y.as_f64(),
      },
    },
    (Value::Array(xs), Value::Array(ys)) => {
      xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
    }
    (Value::Object(xs), Value::Object(ys)) => {
      xs.len() == ys.len() && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
    }
    _ => a == b,
  }
}

/// Log-safe truncation for large strings (e.g. learner code or runner stderr).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn python_repr_of_scalars() {
    assert_eq!(to_python_repr(&Value::Null), "None");
    assert_eq!(to_python_repr(&json!(true)), "True");
    assert_eq!(to_python_repr(&json!(false)), "False");
    assert_eq!(to_python_repr(&json!(42)), "42");
    assert_eq!(to_python_repr(&json!("a\tb\nc")), "\"a\\tb\\nc\"");
  }

  #[test]
  fn python_repr_of_containers() {
    assert_eq!(to_python_repr(&json!([1, "x", null])), "[1, \"x\", None]");
    assert_eq!(to_python_repr(&json!({"a": [true]})), "{\"a\": [True]}");
    assert_eq!(to_python_repr(&json!([])), "[]");
  }

  #[test]
  fn python_literals_escape_quotes_and_backslashes() {
    assert_eq!(to_python_literal(&json!("it's")), r"'it\'s'");
    assert_eq!(to_python_literal(&json!("a\\b\nc")), r"'a\\b\nc'");
    assert_eq!(to_python_literal(&json!([null, 1.5, {"k": false}])), "[None, 1.5, {'k': False}]");
  }

  #[test]
  fn numbers_compare_by_value() {
    let float_two: Value = serde_json::from_str("2.0").expect("json");
    assert!(values_equal(&float_two, &json!(2)));
    assert!(values_equal(&json!([1, {"k": 2.0}]), &json!([1.0, {"k": 2}])));
    assert!(!values_equal(&json!(2.5), &json!(2)));
    assert!(!values_equal(&json!(u64::MAX), &json!(-1)));
    assert!(!values_equal(&json!([1, 2]), &json!([1])));
    assert!(!values_equal(&json!({"a": 1}), &json!({"b": 1})));
    assert!(!values_equal(&json!("2"), &json!(2)));
  }

  #[test]
  fn template_and_truncation() {
    assert_eq!(fill_template("runs in {expected} time", &[("expected", "linear")]), "runs in linear time");
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("héllo world", 2).starts_with('h'));
  }
}
