//! Structural check of a CSV file against the dialect the engine sniffed.
//!
//! The engine's auto-detector tolerates ragged input by skipping leading
//! lines or padding short rows. A load is only accepted when every record
//! has as many fields as the header, and the loaded table matches that shape.

/// Header width and number of data records in a CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CsvShape {
    pub fields: usize,
    pub records: u64,
}

/// Count records in `data`, failing on ragged rows or an unterminated quote.
///
/// Blank lines are ignored. A quote character is escaped by doubling it.
pub(crate) fn scan(data: &[u8], delimiter: u8, quote: Option<u8>) -> Result<CsvShape, String> {
    let mut scanner = Scanner::default();
    let mut in_quotes = false;
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        if in_quotes {
            if Some(b) == quote {
                if data.get(i + 1) == Some(&b) {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            } else if b == b'\n' {
                scanner.line += 1;
            }
        } else if Some(b) == quote {
            in_quotes = true;
            scanner.empty = false;
        } else if b == delimiter {
            scanner.fields += 1;
            scanner.empty = false;
        } else if b == b'\n' || b == b'\r' {
            if b == b'\r' && data.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
            scanner.finish_record()?;
            scanner.line += 1;
            scanner.start_line = scanner.line;
        } else {
            scanner.empty = false;
        }
        i += 1;
    }

    if in_quotes {
        return Err(format!(
            "unterminated quoted field starting on line {}",
            scanner.start_line
        ));
    }
    scanner.finish_record()?;

    match scanner.header {
        Some(fields) => Ok(CsvShape {
            fields,
            records: scanner.records,
        }),
        None => Err("no header row".to_string()),
    }
}

struct Scanner {
    header: Option<usize>,
    records: u64,
    fields: usize,
    empty: bool,
    line: usize,
    start_line: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            header: None,
            records: 0,
            fields: 1,
            empty: true,
            line: 1,
            start_line: 1,
        }
    }
}

impl Scanner {
    fn finish_record(&mut self) -> Result<(), String> {
        if !self.empty {
            match self.header {
                None => self.header = Some(self.fields),
                Some(expected) if expected != self.fields => {
                    return Err(format!(
                        "line {}: expected {expected} fields, found {}",
                        self.start_line, self.fields
                    ));
                }
                Some(_) => self.records += 1,
            }
        }
        self.fields = 1;
        self.empty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(csv: &str) -> Result<CsvShape, String> {
        scan(csv.as_bytes(), b',', Some(b'"'))
    }

    #[test]
    fn counts_records_after_header() {
        let s = shape("a,b,c\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(s, CsvShape { fields: 3, records: 2 });

        // No trailing newline, CRLF endings, blank lines.
        assert_eq!(shape("a,b\r\n1,2\r\n\r\n3,4").unwrap().records, 2);
        assert_eq!(shape("a,b\n").unwrap().records, 0);
    }

    #[test]
    fn quoted_fields_may_hold_delimiters_and_newlines() {
        let s = shape("name,note\n\"Acme, Inc\",\"two\nlines\"\n\"Say \"\"hi\"\"\",x\n").unwrap();
        assert_eq!(s, CsvShape { fields: 2, records: 2 });
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = shape("a,b,c\n1,2,3\n4,5\n6,7,8,9,10\n").unwrap_err();
        assert_eq!(err, "line 3: expected 3 fields, found 2");

        let err = shape("a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(err.contains("line 3"), "{err}");
    }

    #[test]
    fn unterminated_quote_and_empty_input() {
        let err = shape("a,b\n\"open,1\n2,3\n").unwrap_err();
        assert!(err.contains("unterminated"), "{err}");
        assert_eq!(shape("").unwrap_err(), "no header row");
        assert_eq!(shape("\n\n").unwrap_err(), "no header row");
    }

    #[test]
    fn other_dialects() {
        let s = scan(b"a\tb\n1\t2\n", b'\t', None).unwrap();
        assert_eq!(s, CsvShape { fields: 2, records: 1 });
        let s = scan(b"a;b\n\"x;y\";2\n", b';', Some(b'"')).unwrap();
        assert_eq!(s.records, 1);
    }
}
