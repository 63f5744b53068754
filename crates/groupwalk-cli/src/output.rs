//! JSON-lines record output.

use std::io::{self, Write};

use serde::Serialize;

/// Writes one JSON document per line.
pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'a, T, I>(&mut self, records: I) -> io::Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupwalk_domain::{CollapsedRecord, ExpandedRecord, MembershipKind, ObjectKind};

    #[test]
    fn test_records_are_written_one_per_line() {
        let mut writer = RecordWriter::new(Vec::new());
        let records = vec![
            ExpandedRecord {
                parent_group: "g1".to_string(),
                member_key: "u1".to_string(),
                member_type: ObjectKind::User,
                level: 1,
                membership_kind: MembershipKind::Direct,
            },
            ExpandedRecord {
                parent_group: "g2".to_string(),
                member_key: "u1".to_string(),
                member_type: ObjectKind::User,
                level: 2,
                membership_kind: MembershipKind::RedundantlyNested,
            },
        ];
        writer.write_all(&records).unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["parent_group"], "g1");
        assert_eq!(lines[1]["level"], 2);
        assert_eq!(
            lines[1]["membership_kind"],
            serde_json::to_value(MembershipKind::RedundantlyNested).unwrap()
        );
    }

    #[test]
    fn test_collapsed_record_shape() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_record(&CollapsedRecord {
                root_group: "g1".to_string(),
                member_keys: "u1;u2".to_string(),
                member_count: 2,
            })
            .unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\"root_group\":\"g1\",\"member_keys\":\"u1;u2\",\"member_count\":2}\n"
        );
    }
}
