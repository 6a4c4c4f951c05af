//! Field parser for canonical report text.
//!
//! Turns the cleaned body of a report form email into [`ParsedFields`] with a
//! single left-to-right line scan. Labels are literal, case-sensitive prefixes
//! listed in [`FIELD_LABELS`]; the table drives the scan, so changing the form
//! vocabulary means editing the table only.

/// Description used when a report carries no usable text
pub const DESCRIPTION_PLACEHOLDER: &str = "Ingen beskrivning tillgänglig";

/// Token that starts the signature/footer block
pub const SEPARATOR: &str = "---";

/// Structured fields extracted from one report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub apartment: String,
    /// Never empty after [`parse`]
    pub description: String,
}

/// What a label introduces
#[derive(Clone, Copy)]
pub enum LabelTarget {
    /// Single-line field, stored by the setter
    Field(fn(&mut ParsedFields, String)),
    /// Start of the free-text description
    Description,
}

/// Ordered label table: (literal prefix, target)
pub const FIELD_LABELS: &[(&str, LabelTarget)] = &[
    ("Namn:", LabelTarget::Field(set_name)),
    ("E-post:", LabelTarget::Field(set_email)),
    ("Telefonnummer:", LabelTarget::Field(set_phone)),
    ("Adress:", LabelTarget::Field(set_address)),
    ("Lägenhetsnummer:", LabelTarget::Field(set_apartment)),
    ("Meddelande:", LabelTarget::Description),
];

fn set_name(fields: &mut ParsedFields, value: String) {
    fields.name = value;
}

fn set_email(fields: &mut ParsedFields, value: String) {
    fields.email = value;
}

fn set_phone(fields: &mut ParsedFields, value: String) {
    fields.phone = value;
}

fn set_address(fields: &mut ParsedFields, value: String) {
    fields.address = value;
}

fn set_apartment(fields: &mut ParsedFields, value: String) {
    fields.apartment = value;
}

/// Every label literal, in table order
pub fn label_literals() -> impl Iterator<Item = &'static str> {
    FIELD_LABELS.iter().map(|(label, _)| *label)
}

/// True for a line made only of three or more dashes
pub fn is_separator_line(line: &str) -> bool {
    line.len() >= SEPARATOR.len() && line.chars().all(|c| c == '-')
}

/// Parse canonical text into fields.
///
/// Never fails: missing fields stay empty and an empty description is replaced
/// by [`DESCRIPTION_PLACEHOLDER`]. A later label overwrites an earlier one. A
/// body without any label becomes the description.
pub fn parse(text: &str) -> ParsedFields {
    let mut scan = Scan::default();

    for line in text.lines() {
        if scan.past_separator {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        scan.line(line);
    }

    scan.finish()
}

#[derive(Default)]
struct Scan {
    fields: ParsedFields,
    description: String,
    in_description: bool,
    past_separator: bool,
    saw_label: bool,
    /// Lines that matched nothing, used when the body has no labels at all
    unlabeled: Vec<String>,
}

impl Scan {
    fn line(&mut self, line: &str) {
        // A split line may hit the separator before its tail is scanned
        if self.past_separator {
            return;
        }
        if let Some((label, target)) = leading_label(line) {
            self.saw_label = true;
            let rest = line[label.len()..].trim();
            match target {
                LabelTarget::Field(set) => {
                    self.in_description = false;
                    match mid_line_label(rest) {
                        Some(split) => {
                            set(&mut self.fields, rest[..split].trim().to_string());
                            self.line(rest[split..].trim());
                        }
                        None => set(&mut self.fields, rest.to_string()),
                    }
                }
                LabelTarget::Description => {
                    self.in_description = true;
                    self.append_description(rest);
                }
            }
            return;
        }

        if is_separator_line(line) {
            self.past_separator = true;
            self.in_description = false;
            return;
        }

        if self.in_description {
            self.append_description(line);
            return;
        }

        // Two fields glued together by lossy HTML-to-text conversion
        match mid_line_label(line) {
            Some(split) => {
                let (before, after) = line.split_at(split);
                let before = before.trim();
                if !before.is_empty() {
                    self.line(before);
                }
                self.line(after.trim());
            }
            None => self.unlabeled.push(line.to_string()),
        }
    }

    fn append_description(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.description.is_empty() {
            self.description.push('\n');
        }
        self.description.push_str(text);
    }

    fn finish(mut self) -> ParsedFields {
        let raw = if self.saw_label {
            self.description
        } else {
            self.unlabeled.join("\n")
        };

        let mut description = raw.trim();
        if let Some(leak) = description.find(SEPARATOR) {
            description = description[..leak].trim();
        }

        self.fields.description = if description.is_empty() {
            DESCRIPTION_PLACEHOLDER.to_string()
        } else {
            description.to_string()
        };
        self.fields
    }
}

fn leading_label(line: &str) -> Option<(&'static str, LabelTarget)> {
    FIELD_LABELS
        .iter()
        .find(|(label, _)| line.starts_with(label))
        .map(|(label, target)| (*label, *target))
}

/// Byte offset of the earliest label that starts after position 0
fn mid_line_label(text: &str) -> Option<usize> {
    label_literals()
        .filter_map(|label| {
            text.match_indices(label)
                .map(|(idx, _)| idx)
                .find(|idx| *idx > 0)
        })
        .min()
}
