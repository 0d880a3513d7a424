//! Function libraries callable from templates as `prefix:name(args)`

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A template function: resolved arguments in, text out
pub type FunctionFn =
    Arc<dyn Fn(&[String]) -> std::result::Result<String, String> + Send + Sync>;

/// Named set of functions sharing a prefix
#[derive(Clone)]
pub struct FunctionLibrary {
    prefix: String,
    functions: HashMap<String, FunctionFn>,
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionLibrary")
            .field("prefix", &self.prefix)
            .field("functions", &names)
            .finish()
    }
}

impl FunctionLibrary {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            functions: HashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register (or replace) a function
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[String]) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FunctionFn> {
        self.functions.get(name)
    }

    /// The built-in library
    pub fn core(prefix: &str) -> Self {
        let mut lib = Self::new(prefix);
        lib.register("concat", |args| Ok(args.concat()))
            .register("upperCase", |args| Ok(single(args, "upperCase")?.to_uppercase()))
            .register("lowerCase", |args| Ok(single(args, "lowerCase")?.to_lowercase()))
            .register("trim", |args| Ok(single(args, "trim")?.trim().to_string()))
            .register("stringLength", |args| {
                Ok(single(args, "stringLength")?.chars().count().to_string())
            })
            .register("substring", substring)
            .register("randomNumber", |args| {
                let len = length_arg(args)?;
                let mut rng = rand::thread_rng();
                Ok((0..len)
                    .map(|i| {
                        let low = if i == 0 { 1 } else { 0 };
                        char::from(b'0' + rng.gen_range(low..10u8))
                    })
                    .collect())
            })
            .register("randomString", |args| {
                let len = length_arg(args)?;
                Ok(rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect())
            })
            .register("randomUUID", |_| Ok(uuid::Uuid::new_v4().to_string()))
            .register("currentDate", |args| {
                let pattern = args.first().map_or("dd.MM.yyyy", String::as_str);
                let format = java_date_format(pattern)?;
                Ok(chrono::Local::now().format(&format).to_string())
            })
            .register("sum", |args| fold_numbers(args, "sum", |a, b| a + b))
            .register("max", |args| fold_numbers(args, "max", f64::max))
            .register("min", |args| fold_numbers(args, "min", f64::min));
        lib
    }
}

fn single<'a>(args: &'a [String], function: &str) -> std::result::Result<&'a str, String> {
    match args {
        [one] => Ok(one),
        _ => Err(format!("{function} expects exactly one argument, got {}", args.len())),
    }
}

fn length_arg(args: &[String]) -> std::result::Result<usize, String> {
    let raw = single(args, "random")?;
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid length '{raw}'"))
}

fn substring(args: &[String]) -> std::result::Result<String, String> {
    let (text, begin, end) = match args {
        [text, begin] => (text, begin, None),
        [text, begin, end] => (text, begin, Some(end)),
        _ => return Err("substring expects 2 or 3 arguments".to_string()),
    };
    let chars: Vec<char> = text.chars().collect();
    let begin: usize = begin
        .trim()
        .parse()
        .map_err(|_| format!("invalid begin index '{begin}'"))?;
    let end: usize = match end {
        Some(end) => end
            .trim()
            .parse()
            .map_err(|_| format!("invalid end index '{end}'"))?,
        None => chars.len(),
    };
    if begin > end || end > chars.len() {
        return Err(format!(
            "range {begin}..{end} out of bounds for length {}",
            chars.len()
        ));
    }
    Ok(chars[begin..end].iter().collect())
}

fn fold_numbers(
    args: &[String],
    function: &str,
    op: fn(f64, f64) -> f64,
) -> std::result::Result<String, String> {
    if args.is_empty() {
        return Err(format!("{function} expects at least one argument"));
    }
    let mut all_integers = true;
    let mut acc: Option<f64> = None;
    for arg in args {
        let arg = arg.trim();
        all_integers &= arg.parse::<i64>().is_ok();
        let n: f64 = arg.parse().map_err(|_| format!("'{arg}' is not a number"))?;
        acc = Some(acc.map_or(n, |a| op(a, n)));
    }
    let result = acc.unwrap_or_default();
    if all_integers {
        Ok((result as i64).to_string())
    } else {
        Ok(result.to_string())
    }
}

/// Translate a java-style date pattern (`yyyy-MM-dd'T'HH:mm`) into chrono format
pub(crate) fn java_date_format(pattern: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] != '\'' {
                if chars[j] == '%' {
                    out.push_str("%%");
                } else {
                    out.push(chars[j]);
                }
                j += 1;
            }
            if j == i + 1 && j < chars.len() {
                // '' is an escaped quote
                out.push('\'');
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        let spec = match (c, run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1 | 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', _) => "%d",
            ('H', _) => "%H",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('D', _) => "%j",
            ('Z' | 'z', _) => "%z",
            ('X', _) => "%:z",
            _ => return Err(format!("unsupported date pattern letter '{c}' in '{pattern}'")),
        };
        out.push_str(spec);
        i += run;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[&str]) -> std::result::Result<String, String> {
        let lib = FunctionLibrary::core("core");
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        (lib.get(name).unwrap())(&args)
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("concat", &["a", "b", "c"]).unwrap(), "abc");
        assert_eq!(call("upperCase", &["abc"]).unwrap(), "ABC");
        assert_eq!(call("lowerCase", &["ABC"]).unwrap(), "abc");
        assert_eq!(call("stringLength", &["äbc"]).unwrap(), "3");
        assert_eq!(call("substring", &["Hello", "1", "3"]).unwrap(), "el");
        assert_eq!(call("substring", &["Hello", "2"]).unwrap(), "llo");
        assert!(call("substring", &["Hello", "4", "9"]).is_err());
        assert!(call("upperCase", &["a", "b"]).is_err());
    }

    #[test]
    fn test_random_functions() {
        let n = call("randomNumber", &["6"]).unwrap();
        assert_eq!(n.len(), 6);
        assert!(n.chars().all(|c| c.is_ascii_digit()));
        assert!(!n.starts_with('0'));

        assert_eq!(call("randomString", &["12"]).unwrap().len(), 12);
        assert_eq!(call("randomUUID", &[]).unwrap().len(), 36);
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("sum", &["1", "2", "3"]).unwrap(), "6");
        assert_eq!(call("sum", &["1.5", "2"]).unwrap(), "3.5");
        assert_eq!(call("max", &["4", "9", "2"]).unwrap(), "9");
        assert_eq!(call("min", &["4", "9", "2"]).unwrap(), "2");
        assert!(call("sum", &["x"]).is_err());
    }

    #[test]
    fn test_java_date_format() {
        assert_eq!(java_date_format("yyyy-MM-dd").unwrap(), "%Y-%m-%d");
        assert_eq!(
            java_date_format("yyyy-MM-dd'T'HH:mm:ss").unwrap(),
            "%Y-%m-%dT%H:%M:%S"
        );
        assert_eq!(java_date_format("dd.MM.yy").unwrap(), "%d.%m.%y");
        assert!(java_date_format("qqq").is_err());
    }

    #[test]
    fn test_current_date_uses_pattern() {
        let date = call("currentDate", &["yyyy-MM-dd"]).unwrap();
        assert!(chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
    }
}
