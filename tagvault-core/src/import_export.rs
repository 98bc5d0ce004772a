//! CSV import/export for credential records

use crate::{
    database::{CredentialRecord, StoredRecord, Tag},
    records::{conceal, dedup_tag_ids, RecordInput, RecordStore},
    tags::{random_palette_color, TAG_NAME_MAX_CHARS},
    DatabaseError, PasswordManagerError, Result,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Column names of the export header, in order
pub const CSV_COLUMNS: [&str; 7] = [
    "site",
    "username",
    "password",
    "tags",
    "notes",
    "createdAt",
    "updatedAt",
];

/// Separator between tag names in the `tags` column
pub const TAG_SEPARATOR: char = ';';

/// One exported record, plaintext
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub site: String,
    pub username: String,
    pub password: String,
    pub tags: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ExportRow {
    fn fields(&self) -> [&str; 7] {
        [
            &self.site,
            &self.username,
            &self.password,
            &self.tags,
            &self.notes,
            &self.created_at,
            &self.updated_at,
        ]
    }
}

/// One parsed import line. Timestamps in the file are not carried over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRow {
    pub site: String,
    pub username: String,
    pub password: String,
    pub tags: String,
    pub notes: String,
}

/// Outcome of a successful import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub created_tags: usize,
}

/// Records and tags ready to persist, built by [`prepare_import`]
#[derive(Debug)]
pub struct PreparedImport {
    pub records: Vec<StoredRecord>,
    pub new_tags: Vec<Tag>,
    pub skipped: usize,
}

/// Build export rows, resolving tag ids to names. Unknown tag ids are skipped.
pub fn export_records(records: &[CredentialRecord], tags: &[Tag]) -> Vec<ExportRow> {
    records
        .iter()
        .map(|record| {
            let tag_names: Vec<&str> = record
                .tag_ids
                .iter()
                .filter_map(|id| tags.iter().find(|t| t.id == *id))
                .map(|t| t.name.as_str())
                .collect();

            ExportRow {
                site: record.site.clone(),
                username: record.username.clone(),
                password: record.password.clone(),
                tags: tag_names.join(&TAG_SEPARATOR.to_string()),
                notes: record.notes.clone(),
                created_at: record.created_at.to_rfc3339(),
                updated_at: record.updated_at.to_rfc3339(),
            }
        })
        .collect()
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Write rows as CSV: plain header, every data field double-quoted
pub fn write_csv<W: Write>(rows: &[ExportRow], mut writer: W) -> Result<()> {
    let io_err =
        |e: std::io::Error| PasswordManagerError::from(DatabaseError::FileIo(format!("Failed to write CSV: {}", e)));

    writeln!(writer, "{}", CSV_COLUMNS.join(",")).map_err(io_err)?;
    for row in rows {
        let line: Vec<String> = row.fields().iter().map(|f| quote(f)).collect();
        writeln!(writer, "{}", line.join(",")).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// Split CSV text into records of fields.
///
/// Quoted fields may hold commas, doubled quotes and line breaks. Blank
/// lines are dropped.
fn parse_csv_records(text: &str) -> Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut saw_quote = false;
    let mut chars = text.chars().peekable();

    let mut finish_row = |row: &mut Vec<String>, field: &mut String, saw_quote: &mut bool| {
        row.push(std::mem::take(field));
        let blank = row.len() == 1 && row[0].is_empty() && !*saw_quote;
        if blank {
            row.clear();
        } else {
            records.push(std::mem::take(row));
        }
        *saw_quote = false;
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                saw_quote = true;
            }
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => finish_row(&mut row, &mut field, &mut saw_quote),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(PasswordManagerError::Validation(
            "Unterminated quoted field in CSV".to_string(),
        ));
    }
    if !row.is_empty() || !field.is_empty() || saw_quote {
        finish_row(&mut row, &mut field, &mut saw_quote);
    }

    Ok(records)
}

/// Parse CSV text with a header row into import rows.
///
/// Columns are matched by header name; missing columns read as empty and
/// unknown columns are ignored.
pub fn parse_csv(text: &str) -> Result<Vec<ImportRow>> {
    let mut records = parse_csv_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };

    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let site = column("site");
    let username = column("username");
    let password = column("password");
    let tags = column("tags");
    let notes = column("notes");

    let pick = |record: &[String], index: Option<usize>| {
        index
            .and_then(|i| record.get(i))
            .cloned()
            .unwrap_or_default()
    };

    Ok(records
        .map(|record| ImportRow {
            site: pick(&record, site),
            username: pick(&record, username),
            password: pick(&record, password),
            tags: pick(&record, tags),
            notes: pick(&record, notes),
        })
        .collect())
}

/// Turn import rows into records for `user_id`.
///
/// Rows missing site, username or password are skipped, as are rows whose
/// site and username collide with an existing record or an earlier row.
/// Tag names are matched case-insensitively against `existing_tags` and tags
/// created earlier in the same import; unknown names become new tags.
pub fn prepare_import(
    rows: &[ImportRow],
    existing_tags: &[Tag],
    existing_records: &[StoredRecord],
    user_id: Uuid,
    key: &str,
) -> PreparedImport {
    let mut known_tags: Vec<Tag> = existing_tags.to_vec();
    let mut new_tags = Vec::new();
    let mut records: Vec<StoredRecord> = Vec::new();
    let mut skipped = 0;

    for (line, row) in rows.iter().enumerate() {
        let input = RecordInput {
            site: row.site.clone(),
            username: row.username.clone(),
            password: row.password.clone(),
            tag_ids: Vec::new(),
            notes: row.notes.clone(),
        };

        let mut clean = match input.clean() {
            Ok(clean) => clean,
            Err(e) => {
                debug!("Skipping import row {}: {}", line + 1, e);
                skipped += 1;
                continue;
            }
        };

        let collides = existing_records
            .iter()
            .chain(records.iter())
            .any(|r| r.same_account(&clean.site, &clean.username));
        if collides {
            debug!("Skipping import row {}: duplicate entry", line + 1);
            skipped += 1;
            continue;
        }

        let mut tag_ids = Vec::new();
        for name in row.tags.split(TAG_SEPARATOR).map(str::trim) {
            if name.is_empty() {
                continue;
            }
            let name: String = name.chars().take(TAG_NAME_MAX_CHARS).collect();
            let lowered = name.to_lowercase();

            let id = match known_tags.iter().find(|t| t.name.to_lowercase() == lowered) {
                Some(tag) => tag.id,
                None => {
                    let tag = Tag {
                        id: Uuid::new_v4(),
                        user_id,
                        name,
                        description: String::new(),
                        color: random_palette_color().to_string(),
                        created_at: Utc::now(),
                    };
                    known_tags.push(tag.clone());
                    let id = tag.id;
                    new_tags.push(tag);
                    id
                }
            };
            tag_ids.push(id);
        }
        clean.tag_ids = dedup_tag_ids(tag_ids);

        records.push(conceal(Uuid::new_v4(), user_id, clean, key, Utc::now()));
    }

    PreparedImport {
        records,
        new_tags,
        skipped,
    }
}

/// Export the store's records to a CSV file, returning the row count
pub fn export_to_csv(store: &RecordStore<'_>, tags: &[Tag], output: &Path) -> Result<usize> {
    let rows = export_records(&store.list()?, tags);

    let file = std::fs::File::create(output).map_err(|e| {
        PasswordManagerError::from(DatabaseError::FileIo(format!(
            "Failed to create export file: {}",
            e
        )))
    })?;
    write_csv(&rows, std::io::BufWriter::new(file))?;

    info!("Exported {} credential(s) to {:?}", rows.len(), output);
    Ok(rows.len())
}

/// Import a CSV file into the store
pub fn import_from_csv(store: &RecordStore<'_>, input: &Path) -> Result<ImportSummary> {
    let text = std::fs::read_to_string(input).map_err(|e| {
        PasswordManagerError::from(DatabaseError::FileIo(format!(
            "Failed to open import file: {}",
            e
        )))
    })?;

    let rows = parse_csv(&text)?;
    store.import(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::reveal;
    use chrono::TimeZone;

    fn tag(name: &str) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: name.to_string(),
            description: String::new(),
            color: "#3b82f6".to_string(),
            created_at: Utc::now(),
        }
    }

    fn row(site: &str, username: &str, password: &str, tags: &str) -> ImportRow {
        ImportRow {
            site: site.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            tags: tags.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_parse_csv_simple() {
        let text = "site,username,password,tags,notes,createdAt,updatedAt\n\
                    gmail.com,me,pw,Work;Mail,hello,2024-01-01T00:00:00Z,2024-01-01T00:00:00Z\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].site, "gmail.com");
        assert_eq!(rows[0].tags, "Work;Mail");
        assert_eq!(rows[0].notes, "hello");
    }

    #[test]
    fn test_parse_csv_with_comma_and_quotes() {
        let text = "site,username,password\n\"Last, First\",user,\"pass\"\"word\"\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows[0].site, "Last, First");
        assert_eq!(rows[0].password, "pass\"word");
    }

    #[test]
    fn test_parse_csv_multiline_field_and_crlf() {
        let text = "site,username,password,notes\r\na.com,me,pw,\"line one\nline two\"\r\n\r\nb.com,you,pw2,\r\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].notes, "line one\nline two");
        assert_eq!(rows[1].site, "b.com");
    }

    #[test]
    fn test_parse_csv_missing_and_extra_columns() {
        let text = "username,extra,site\nme,ignored,a.com\n";
        let rows = parse_csv(text).unwrap();
        assert_eq!(rows[0].site, "a.com");
        assert_eq!(rows[0].username, "me");
        assert_eq!(rows[0].password, "");
        assert_eq!(rows[0].tags, "");
    }

    #[test]
    fn test_parse_csv_short_row_and_empty_input() {
        let rows = parse_csv("site,username,password,notes\na.com,me\n").unwrap();
        assert_eq!(rows[0].username, "me");
        assert_eq!(rows[0].notes, "");

        assert!(parse_csv("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_csv_unterminated_quote() {
        assert!(matches!(
            parse_csv("site\n\"open"),
            Err(PasswordManagerError::Validation(_))
        ));
    }

    #[test]
    fn test_export_resolves_tags_and_quotes() {
        let work = tag("Work");
        let missing = Uuid::new_v4();
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            site: "a.com".to_string(),
            username: "me".to_string(),
            password: "say \"hi\"".to_string(),
            tag_ids: vec![missing, work.id],
            notes: String::new(),
            salt: None,
            created_at: when,
            updated_at: when,
        };

        let rows = export_records(&[record], &[work]);
        assert_eq!(rows[0].tags, "Work");

        let mut out = Vec::new();
        write_csv(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("site,username,password,tags,notes,createdAt,updatedAt")
        );
        assert_eq!(
            lines.next(),
            Some(
                "\"a.com\",\"me\",\"say \"\"hi\"\"\",\"Work\",\"\",\
                 \"2024-01-01T00:00:00+00:00\",\"2024-01-01T00:00:00+00:00\""
            )
        );

        let parsed = parse_csv(&text).unwrap();
        assert_eq!(parsed[0].password, "say \"hi\"");
    }

    #[test]
    fn test_prepare_import_skips_incomplete_rows() {
        let rows = vec![
            row("a.com", "me", "one", ""),
            row("b.com", "me", "", ""),
            row("c.com", "me", "three", ""),
        ];
        let prepared = prepare_import(&rows, &[], &[], Uuid::nil(), "key");

        assert_eq!(prepared.records.len(), 2);
        assert_eq!(prepared.skipped, 1);
        assert_eq!(prepared.records[0].site, "a.com");
        assert_eq!(prepared.records[1].site, "c.com");
    }

    #[test]
    fn test_prepare_import_obscures_with_fresh_salts() {
        let rows = vec![row("a.com", "me", "same", ""), row("b.com", "me", "same", "")];
        let prepared = prepare_import(&rows, &[], &[], Uuid::nil(), "key");

        let (a, b) = (&prepared.records[0], &prepared.records[1]);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password, b.password);
        assert_eq!(reveal(&a.password, "key", a.salt.as_deref().unwrap()), "same");
    }

    #[test]
    fn test_prepare_import_resolves_and_creates_tags() {
        let work = tag("Work");
        let rows = vec![
            row("a.com", "me", "pw", "work; Travel ;"),
            row("b.com", "me", "pw", "TRAVEL;Work;work"),
        ];
        let prepared = prepare_import(&rows, &[work.clone()], &[], Uuid::nil(), "key");

        assert_eq!(prepared.new_tags.len(), 1);
        let travel = &prepared.new_tags[0];
        assert_eq!(travel.name, "Travel");
        assert_eq!(travel.description, "");
        assert!(crate::tags::TAG_PALETTE.contains(&travel.color.as_str()));

        assert_eq!(prepared.records[0].tag_ids, vec![work.id, travel.id]);
        assert_eq!(prepared.records[1].tag_ids, vec![travel.id, work.id]);
    }

    #[test]
    fn test_prepare_import_skips_duplicates() {
        let rows = vec![
            row("A.com", "Me", "pw", ""),
            row("a.com", "me", "pw2", ""),
        ];
        let existing = prepare_import(&[row("b.com", "me", "x", "")], &[], &[], Uuid::nil(), "k");
        let rows_with_existing = [rows.clone(), vec![row("B.COM", "ME", "y", "")]].concat();

        let prepared = prepare_import(&rows_with_existing, &[], &existing.records, Uuid::nil(), "k");
        assert_eq!(prepared.records.len(), 1);
        assert_eq!(prepared.skipped, 2);
    }
}
