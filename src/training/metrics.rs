//! Step-wise loss bookkeeping for training logs
//!
//! Each optimization step produces a set of named loss terms. The record
//! preserves insertion order so log lines and scalar files always list
//! the terms in the same sequence.

use std::fmt;

/// Named loss values from one optimization step
#[derive(Debug, Clone, Default)]
pub struct LossRecord {
    entries: Vec<(String, f64)>,
}

impl LossRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, overwriting in place if the tag already exists
    pub fn insert(&mut self, tag: &str, value: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| t == tag) {
            entry.1 = value;
        } else {
            self.entries.push((tag.to_string(), value));
        }
    }

    /// Append all entries of another record
    pub fn merge(&mut self, other: LossRecord) {
        for (tag, value) in other.entries {
            self.insert(&tag, value);
        }
    }

    /// Look up a value by tag
    pub fn get(&self, tag: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| *v)
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), *v))
    }

    /// Number of recorded terms
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for LossRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (tag, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.4}", tag, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut record = LossRecord::new();
        record.insert("D/loss_real", 0.5);
        record.insert("D/loss_fake", -0.25);
        record.insert("D/loss_cls", 1.0);

        let tags: Vec<&str> = record.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["D/loss_real", "D/loss_fake", "D/loss_cls"]);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut record = LossRecord::new();
        record.insert("G/loss_fake", 1.0);
        record.insert("G/loss_rec", 2.0);
        record.insert("G/loss_fake", 3.0);

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("G/loss_fake"), Some(3.0));
        let tags: Vec<&str> = record.iter().map(|(t, _)| t).collect();
        assert_eq!(tags, vec!["G/loss_fake", "G/loss_rec"]);
    }

    #[test]
    fn test_merge_appends() {
        let mut d_losses = LossRecord::new();
        d_losses.insert("D/loss_real", 0.1);

        let mut g_losses = LossRecord::new();
        g_losses.insert("G/loss_fake", 0.2);

        d_losses.merge(g_losses);
        assert_eq!(d_losses.len(), 2);
        assert_eq!(d_losses.get("G/loss_fake"), Some(0.2));
    }

    #[test]
    fn test_display_format() {
        let mut record = LossRecord::new();
        record.insert("D/loss_real", 0.5);
        record.insert("D/loss_gp", 1.25);

        assert_eq!(record.to_string(), "D/loss_real: 0.5000, D/loss_gp: 1.2500");
    }
}
