//! Record search: free-text query combined with required tags

use crate::database::{CredentialRecord, Tag};
use uuid::Uuid;

/// Maximum number of records a search returns unless configured otherwise
pub const DEFAULT_RESULT_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub required_tag_ids: Vec<Uuid>,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            required_tag_ids: Vec::new(),
            limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

fn has_all_tags(record: &CredentialRecord, required: &[Uuid]) -> bool {
    required.iter().all(|id| record.tag_ids.contains(id))
}

fn matches_text(record: &CredentialRecord, tags: &[Tag], needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    contains(&record.site)
        || contains(&record.username)
        || contains(&record.notes)
        || record
            .tag_ids
            .iter()
            .filter_map(|id| tags.iter().find(|t| t.id == *id))
            .any(|t| contains(&t.name))
}

/// Records matching both the text and every required tag, in input order,
/// capped at `query.limit`.
pub fn filter_records<'r>(
    records: &'r [CredentialRecord],
    tags: &[Tag],
    query: &SearchQuery,
) -> Vec<&'r CredentialRecord> {
    let needle = query.text.trim().to_lowercase();

    records
        .iter()
        .filter(|r| has_all_tags(r, &query.required_tag_ids))
        .filter(|r| matches_text(r, tags, &needle))
        .take(query.limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(site: &str, tag_ids: Vec<Uuid>) -> CredentialRecord {
        let now = Utc::now();
        CredentialRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            site: site.to_string(),
            username: "me".to_string(),
            password: "pw".to_string(),
            tag_ids,
            notes: String::new(),
            salt: None,
            created_at: now,
            updated_at: now,
        }
    }

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

    fn query(text: &str, required_tag_ids: Vec<Uuid>) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            required_tag_ids,
            ..Default::default()
        }
    }

    fn sites<'a>(found: &[&'a CredentialRecord]) -> Vec<&'a str> {
        found.iter().map(|r| r.site.as_str()).collect()
    }

    #[test]
    fn test_text_and_tags_combine() {
        let (a, b) = (tag("Personal"), tag("Finance"));
        let records = vec![
            record("gmail.com", vec![a.id]),
            record("yahoo.com", vec![a.id, b.id]),
            record("gmail.org", vec![b.id]),
        ];
        let tags = vec![a.clone(), b.clone()];

        let found = filter_records(&records, &tags, &query("gmail", vec![a.id]));
        assert_eq!(sites(&found), vec!["gmail.com"]);

        let found = filter_records(&records, &tags, &query("", vec![a.id, b.id]));
        assert_eq!(sites(&found), vec!["yahoo.com"]);

        let found = filter_records(&records, &tags, &query("  MAIL ", vec![]));
        assert_eq!(sites(&found), vec!["gmail.com", "gmail.org"]);

        let found = filter_records(&records, &tags, &query(" ", vec![]));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_matches_username_notes_and_tag_names() {
        let finance = tag("Finance");
        let mut by_user = record("a.com", vec![]);
        by_user.username = "banker".to_string();
        let mut by_notes = record("b.com", vec![]);
        by_notes.notes = "Bank PIN inside".to_string();
        let by_tag = record("c.com", vec![finance.id]);
        let unrelated = record("d.com", vec![]);

        let records = vec![by_user, by_notes, by_tag, unrelated];
        let found = filter_records(&records, &[finance.clone()], &query("bank", vec![]));
        assert_eq!(sites(&found), vec!["a.com", "b.com"]);

        let found = filter_records(&records, &[finance], &query("fin", vec![]));
        assert_eq!(sites(&found), vec!["c.com"]);
    }

    #[test]
    fn test_dangling_tag_ids_are_skipped() {
        let records = vec![record("a.com", vec![Uuid::new_v4()])];
        assert!(filter_records(&records, &[], &query("zzz", vec![])).is_empty());
        assert_eq!(filter_records(&records, &[], &query("a.com", vec![])).len(), 1);
    }

    #[test]
    fn test_results_are_capped() {
        let records: Vec<_> = (0..150)
            .map(|i| record(&format!("site{}.com", i), vec![]))
            .collect();

        let found = filter_records(&records, &[], &query("site", vec![]));
        assert_eq!(found.len(), DEFAULT_RESULT_LIMIT);
        assert_eq!(found[0].site, "site0.com");

        let narrow = SearchQuery {
            limit: 5,
            ..query("", vec![])
        };
        assert_eq!(filter_records(&records, &[], &narrow).len(), 5);
    }
}
