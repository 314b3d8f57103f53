use std::slice;

use serde::{Deserialize, Serialize};

use super::HeaderName;

/// Ordered header multimap
///
/// Values are grouped by canonical [`HeaderName`]. Groups keep the order in
/// which their name first appeared and each group keeps the order of its
/// values, so repeated headers such as `Via` stay in routing order.
///
/// Values are plain strings; typed views are provided by
/// [`HeaderAccess`](super::HeaderAccess). The map never hands out its
/// internal vectors mutably, all edits go through the methods below.
///
/// ```rust
/// use sipwire_sip_core::prelude::*;
///
/// let mut headers = Headers::new();
/// headers.add("Via", "SIP/2.0/UDP a.example.com");
/// headers.add("v", "SIP/2.0/UDP b.example.com");
/// headers.insert_first(HeaderName::VIA, "SIP/2.0/UDP c.example.com");
///
/// assert_eq!(headers.get_all(&HeaderName::VIA).len(), 3);
/// assert_eq!(headers.get(&HeaderName::VIA), Some("SIP/2.0/UDP c.example.com"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    groups: Vec<(HeaderName, Vec<String>)>,
}

impl Headers {
    /// Empty header map
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, name: &HeaderName) -> Option<&Vec<String>> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }

    fn group_mut(&mut self, name: &HeaderName) -> Option<&mut Vec<String>> {
        self.groups
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }

    /// Appends a value after any existing values of the same header
    pub fn add(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.group_mut(&name) {
            Some(values) => values.push(value),
            None => self.groups.push((name, vec![value])),
        }
    }

    /// Prepends a value before any existing values of the same header
    pub fn insert_first(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.group_mut(&name) {
            Some(values) => values.insert(0, value),
            None => self.groups.push((name, vec![value])),
        }
    }

    /// Replaces every value of the header with a single value
    pub fn set(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.group_mut(&name) {
            Some(values) => {
                values.clear();
                values.push(value);
            }
            None => self.groups.push((name, vec![value])),
        }
    }

    /// Replaces the first value of the header, adding it when absent
    pub fn set_first(&mut self, name: impl Into<HeaderName>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.group_mut(&name) {
            Some(values) if !values.is_empty() => values[0] = value,
            Some(values) => values.push(value),
            None => self.groups.push((name, vec![value])),
        }
    }

    /// First value of the header
    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.group(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of the header in order, empty when absent
    pub fn get_all(&self, name: &HeaderName) -> &[String] {
        self.group(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether at least one value is present
    pub fn contains(&self, name: &HeaderName) -> bool {
        !self.get_all(name).is_empty()
    }

    /// Removes the header entirely, returning its values
    pub fn remove(&mut self, name: &HeaderName) -> Vec<String> {
        match self.groups.iter().position(|(n, _)| n == name) {
            Some(index) => self.groups.remove(index).1,
            None => Vec::new(),
        }
    }

    /// Removes and returns the first value; the header disappears with its
    /// last value.
    pub fn pop_first(&mut self, name: &HeaderName) -> Option<String> {
        let index = self.groups.iter().position(|(n, _)| n == name)?;
        let values = &mut self.groups[index].1;
        let first = if values.is_empty() {
            None
        } else {
            Some(values.remove(0))
        };
        if self.groups[index].1.is_empty() {
            self.groups.remove(index);
        }
        first
    }

    /// Header names in first-appearance order
    pub fn names(&self) -> impl Iterator<Item = &HeaderName> {
        self.groups.iter().map(|(name, _)| name)
    }

    /// Every `(name, value)` pair in serialization order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            groups: self.groups.iter(),
            current: None,
        }
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the map holds no headers
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Iterator over `(name, value)` pairs of a [`Headers`] map
pub struct Iter<'a> {
    groups: slice::Iter<'a, (HeaderName, Vec<String>)>,
    current: Option<(&'a HeaderName, slice::Iter<'a, String>)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a HeaderName, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, values)) = &mut self.current {
                if let Some(value) = values.next() {
                    return Some((*name, value.as_str()));
                }
            }
            let (name, values) = self.groups.next()?;
            self.current = Some((name, values.iter()));
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_order_preserved() {
        let mut headers = Headers::new();
        headers.add("To", "<sip:bob@example.com>");
        headers.add("Via", "SIP/2.0/UDP a");
        headers.add("From", "<sip:alice@example.com>");
        headers.add("v", "SIP/2.0/UDP b");

        let pairs: Vec<_> = headers.iter().map(|(n, v)| (n.as_str(), v)).collect();
        assert_eq!(
            pairs,
            vec![
                ("to", "<sip:bob@example.com>"),
                ("via", "SIP/2.0/UDP a"),
                ("via", "SIP/2.0/UDP b"),
                ("from", "<sip:alice@example.com>"),
            ]
        );
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers = Headers::new();
        headers.add("Expires", "10");
        headers.add("Expires", "20");
        headers.set(HeaderName::EXPIRES, "30");
        assert_eq!(headers.get_all(&HeaderName::EXPIRES), ["30".to_string()]);
    }

    #[test]
    fn test_pop_first_drops_empty_group() {
        let mut headers = Headers::new();
        headers.add("Via", "one");
        headers.add("Via", "two");
        assert_eq!(headers.pop_first(&HeaderName::VIA).as_deref(), Some("one"));
        assert_eq!(headers.pop_first(&HeaderName::VIA).as_deref(), Some("two"));
        assert!(!headers.contains(&HeaderName::VIA));
        assert!(headers.is_empty());
        assert_eq!(headers.pop_first(&HeaderName::VIA), None);
    }

    #[test]
    fn test_set_first_and_remove() {
        let mut headers = Headers::new();
        headers.set_first(HeaderName::VIA, "new");
        headers.add("Via", "old");
        headers.set_first(HeaderName::VIA, "newer");
        assert_eq!(headers.get_all(&HeaderName::VIA), ["newer".to_string(), "old".to_string()]);

        assert_eq!(headers.remove(&HeaderName::VIA).len(), 2);
        assert!(headers.remove(&HeaderName::VIA).is_empty());
    }
}
