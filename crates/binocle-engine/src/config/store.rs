use std::collections::HashMap;

/// String-keyed parameter store.
///
/// Typed getters never fail: missing or unparsable values yield the caller's
/// default. Range checking is the store owner's job.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<&str>;

    fn set(&mut self, key: &str, value: &str);

    fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Accepts `1`/`0` and `true`/`false`.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::trim) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            _ => default,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }

    /// Reads a flag and clears it if it was set.
    fn take_flag(&mut self, key: &str, default: bool) -> bool {
        let value = self.get_bool(key, default);
        if value {
            self.set_bool(key, false);
        }
        value
    }
}

/// In-process [`ConfigStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    values: HashMap<String, String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `key=value` lines. Blank lines and `#` comments are skipped;
    /// malformed lines are logged and ignored.
    pub fn parse_overrides(&mut self, text: &str) {
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => self.set(k.trim(), v.trim()),
                _ => log::warn!("config line {}: expected key=value, got {line:?}", n + 1),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_owned(), value.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_yield_defaults() {
        let store = MemoryConfigStore::new();
        assert_eq!(store.get_f32("a", 0.5), 0.5);
        assert_eq!(store.get_i32("a", 2), 2);
        assert!(store.get_bool("a", true));
    }

    #[test]
    fn unparsable_values_yield_defaults() {
        let mut store = MemoryConfigStore::new();
        store.set("a", "wide");
        assert_eq!(store.get_i32("a", 2), 2);
        assert!(!store.get_bool("a", false));
    }

    #[test]
    fn take_flag_clears_after_read() {
        let mut store = MemoryConfigStore::new();
        assert!(store.take_flag("changed", true));
        assert!(!store.take_flag("changed", true));
        store.set_bool("changed", true);
        assert!(store.take_flag("changed", true));
        assert_eq!(store.get("changed"), Some("0"));
    }

    #[test]
    fn parse_overrides_skips_comments_and_garbage() {
        let mut store = MemoryConfigStore::new();
        store.parse_overrides("# lens\nstereo.height_scale = 0.6\n\nnonsense\n=1\n");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_f32("stereo.height_scale", 0.0), 0.6);
    }
}
