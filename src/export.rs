//! Pure rendering of registry snapshots for downstream consumers.
//!
//! Nothing in this module performs I/O; callers print the line, append it to
//! a file, or hand the structured values to a GUI.

use std::fmt::Write;

use crate::types::Channel;

/// Render a snapshot as one CSV line: `"v1 ,v2 ,…,vN ,"`.
///
/// The format is fixed for compatibility with existing downstream readers:
/// one cell per channel in registry order, each value followed by `" ,"`,
/// trailing separator included, no header.  Floats keep their minimal
/// round-trip form, so a fresh channel renders as `0.0` and a whole-number
/// reading keeps its `.0`.
///
/// An empty snapshot renders as the empty string.
///
/// # Example
///
/// ```
/// # use stretchsense_rs::export::to_csv_line;
/// # use stretchsense_rs::registry::Registry;
/// # use stretchsense_rs::types::Generation;
/// let registry = Registry::new();
/// registry.connect_device("SPI0", Generation::Gen3).unwrap();
/// registry.update_block("SPI0", 0, &[1.0, 2.5]);
/// let line = to_csv_line(&registry.snapshot());
/// assert!(line.starts_with("1.0 ,2.5 ,0.0 ,"));
/// ```
pub fn to_csv_line(snapshot: &[Channel]) -> String {
    let mut line = String::with_capacity(snapshot.len() * 8);
    for channel in snapshot {
        // {:?} keeps the shortest representation that round-trips (1.0
        // stays "1.0"), matching the historical export format.
        let _ = write!(line, "{:?} ,", channel.value);
    }
    line
}

/// Values of a snapshot in registry order, for callers that want numbers
/// rather than text.
pub fn values(snapshot: &[Channel]) -> Vec<f64> {
    snapshot.iter().map(|c| c.value).collect()
}
