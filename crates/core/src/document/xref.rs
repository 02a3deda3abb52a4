//! Cross-reference output in table and stream form.

use crate::model::Node;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XrefEntry {
    Free { generation: u16 },
    InUse { offset: u64, generation: u16 },
    InContainer { container: u32, index: usize },
}

/// Entries collected while objects flush.
#[derive(Debug, Default)]
pub(crate) struct XrefBuilder {
    entries: BTreeMap<u32, XrefEntry>,
}

/// Bytes needed to hold `value` big-endian.
fn byte_width(value: u64) -> usize {
    (8 - value.leading_zeros() as usize / 8).max(1)
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        out.push((value >> (shift * 8)) as u8);
    }
}

impl XrefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, number: u32, entry: XrefEntry) {
        self.entries.insert(number, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Object 0 heads the free list with generation 65535.
    fn with_head(&self) -> BTreeMap<u32, XrefEntry> {
        let mut entries = self.entries.clone();
        entries.insert(0, XrefEntry::Free { generation: u16::MAX });
        entries
    }

    /// Next free number after `number`, wrapping to 0 at the end of the list.
    fn next_free(entries: &BTreeMap<u32, XrefEntry>, number: u32) -> u32 {
        entries
            .range(number + 1..)
            .find(|(_, entry)| matches!(entry, XrefEntry::Free { .. }))
            .map_or(0, |(&n, _)| n)
    }

    /// Runs of consecutive object numbers.
    fn subsections(entries: &BTreeMap<u32, XrefEntry>) -> Vec<(u32, Vec<(u32, XrefEntry)>)> {
        let mut runs: Vec<(u32, Vec<(u32, XrefEntry)>)> = Vec::new();
        for (&number, &entry) in entries {
            match runs.last_mut() {
                Some((first, run)) if *first + run.len() as u32 == number => {
                    run.push((number, entry));
                }
                _ => runs.push((number, vec![(number, entry)])),
            }
        }
        runs
    }

    /// Classic `xref` section with 20-byte entries.
    pub fn write_table(&self) -> Vec<u8> {
        let entries = self.with_head();
        let mut out = b"xref\n".to_vec();
        for (first, run) in Self::subsections(&entries) {
            out.extend_from_slice(format!("{} {}\n", first, run.len()).as_bytes());
            for (number, entry) in run {
                let line = match entry {
                    XrefEntry::Free { generation } => format!(
                        "{:010} {:05} f \n",
                        Self::next_free(&entries, number),
                        generation
                    ),
                    XrefEntry::InUse { offset, generation } => {
                        format!("{offset:010} {generation:05} n \n")
                    }
                    // Containers imply the stream form; an old reader sees a free slot.
                    XrefEntry::InContainer { .. } => format!("{:010} {:05} f \n", 0, 0),
                };
                out.extend_from_slice(line.as_bytes());
            }
        }
        out
    }

    /// Binary rows, `/W` widths and `/Index` pairs of the stream form.
    pub fn stream_rows(&self) -> (Vec<u8>, [usize; 3], Vec<Node>) {
        let entries = self.with_head();
        let (mut max_field1, mut max_field2) = (0u64, 0u64);
        for (&number, entry) in &entries {
            let (f1, f2) = match *entry {
                XrefEntry::Free { generation } => {
                    (u64::from(Self::next_free(&entries, number)), u64::from(generation))
                }
                XrefEntry::InUse { offset, generation } => (offset, u64::from(generation)),
                XrefEntry::InContainer { container, index } => {
                    (u64::from(container), index as u64)
                }
            };
            max_field1 = max_field1.max(f1);
            max_field2 = max_field2.max(f2);
        }
        let widths = [1, byte_width(max_field1), byte_width(max_field2).max(2)];

        let mut rows = Vec::with_capacity(entries.len() * widths.iter().sum::<usize>());
        let mut index = Vec::new();
        for (first, run) in Self::subsections(&entries) {
            index.push(Node::from(first));
            index.push(Node::from(run.len()));
            for (number, entry) in run {
                let (kind, f1, f2) = match entry {
                    XrefEntry::Free { generation } => (
                        0,
                        u64::from(Self::next_free(&entries, number)),
                        u64::from(generation),
                    ),
                    XrefEntry::InUse { offset, generation } => (1, offset, u64::from(generation)),
                    XrefEntry::InContainer { container, index } => {
                        (2, u64::from(container), index as u64)
                    }
                };
                rows.push(kind);
                push_be(&mut rows, f1, widths[1]);
                push_be(&mut rows, f2, widths[2]);
            }
        }
        (rows, widths, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_links_free_entries() {
        let mut xref = XrefBuilder::new();
        xref.record(1, XrefEntry::InUse { offset: 15, generation: 0 });
        xref.record(2, XrefEntry::Free { generation: 1 });
        xref.record(5, XrefEntry::InUse { offset: 120, generation: 0 });
        let table = String::from_utf8(xref.write_table()).unwrap().replace(" \n", "\n");
        insta::assert_snapshot!(table, @r"
        xref
        0 3
        0000000002 65535 f
        0000000015 00000 n
        0000000000 00001 f
        5 1
        0000000120 00000 n
        ");
    }

    #[test]
    fn entries_are_twenty_bytes() {
        let mut xref = XrefBuilder::new();
        xref.record(1, XrefEntry::InUse { offset: 9, generation: 0 });
        let table = xref.write_table();
        let body = &table[b"xref\n0 2\n".len()..];
        assert_eq!(body.len(), 40);
    }

    #[test]
    fn stream_rows_use_minimal_widths() {
        let mut xref = XrefBuilder::new();
        xref.record(1, XrefEntry::InUse { offset: 300, generation: 0 });
        xref.record(2, XrefEntry::InContainer { container: 1, index: 3 });
        let (rows, widths, index) = xref.stream_rows();
        assert_eq!(widths, [1, 2, 2]);
        assert_eq!(index, vec![Node::from(0u32), Node::from(3usize)]);
        assert_eq!(
            hex::encode(rows),
            "000000ffff".to_string() + "01012c0000" + "0200010003"
        );
    }
}
