//! Bounded anchor searches.
//!
//! Both the package index parser and the Ogg repair engine need to recover
//! from damaged input by looking a little further ahead for something that
//! looks like the start of a valid structure. This module holds that search
//! once, parameterized by a validity predicate.

use memchr::memmem;

/// Find the first position in `[start, start + window)` accepted by `accept`.
///
/// The predicate receives the whole buffer and the candidate position so it
/// can look around the candidate. Positions past the end of `data` are never
/// offered.
///
/// # Example
///
/// ```
/// use stkpak_common::scan::find_anchor;
///
/// let data = b"..xx..";
/// assert_eq!(find_anchor(data, 0, 4, |d, p| d[p] == b'x'), Some(2));
/// assert_eq!(find_anchor(data, 0, 2, |d, p| d[p] == b'x'), None);
/// ```
pub fn find_anchor<F>(data: &[u8], start: usize, window: usize, mut accept: F) -> Option<usize>
where
    F: FnMut(&[u8], usize) -> bool,
{
    let end = start.saturating_add(window).min(data.len());
    (start..end).find(|&pos| accept(data, pos))
}

/// Every position where `needle` occurs, without overlaps.
pub fn find_all(data: &[u8], needle: &[u8]) -> Vec<usize> {
    memmem::find_iter(data, needle).collect()
}

/// Position of the first occurrence of `needle` at or after `from`.
pub fn find_from(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > data.len() {
        return None;
    }
    memmem::find(&data[from..], needle).map(|pos| from + pos)
}
