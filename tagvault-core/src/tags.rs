//! Tag store: named, colored labels attached to credential records

use crate::{database::Tag, repository::Repository, PasswordManagerError, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use uuid::Uuid;

pub const TAG_NAME_MAX_CHARS: usize = 40;
pub const TAG_DESCRIPTION_MAX_CHARS: usize = 255;
pub const DEFAULT_TAG_COLOR: &str = "#3b82f6";

/// Preset colors offered for new tags
pub const TAG_PALETTE: [&str; 12] = [
    "#3b82f6", "#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#06b6d4", "#84cc16",
    "#f97316", "#14b8a6", "#a855f7", "#dc2626",
];

/// Pick a palette color at random
pub fn random_palette_color() -> &'static str {
    TAG_PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFAULT_TAG_COLOR)
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Fields supplied when creating or editing a tag
#[derive(Debug, Clone, Default)]
pub struct TagInput {
    pub name: String,
    pub description: String,
    pub color: String,
}

impl TagInput {
    fn clean(self) -> Result<TagInput> {
        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();
        let color = match self.color.trim() {
            "" => DEFAULT_TAG_COLOR.to_string(),
            c => c.to_lowercase(),
        };

        if name.is_empty() {
            return Err(PasswordManagerError::Validation(
                "Tag name is required".to_string(),
            ));
        }
        if name.chars().count() > TAG_NAME_MAX_CHARS {
            return Err(PasswordManagerError::Validation(format!(
                "Tag name must be at most {} characters",
                TAG_NAME_MAX_CHARS
            )));
        }
        if description.chars().count() > TAG_DESCRIPTION_MAX_CHARS {
            return Err(PasswordManagerError::Validation(format!(
                "Tag description must be at most {} characters",
                TAG_DESCRIPTION_MAX_CHARS
            )));
        }
        if !is_hex_color(&color) {
            return Err(PasswordManagerError::Validation(format!(
                "Invalid tag color: {}",
                color
            )));
        }

        Ok(TagInput {
            name,
            description,
            color,
        })
    }
}

fn name_taken(tags: &[Tag], name: &str, exclude: Option<Uuid>) -> bool {
    let wanted = name.trim().to_lowercase();
    tags.iter()
        .any(|t| Some(t.id) != exclude && t.name.trim().to_lowercase() == wanted)
}

/// Tags owned by one user
pub struct TagStore<'a> {
    repo: &'a dyn Repository,
    user_id: Uuid,
}

impl<'a> TagStore<'a> {
    pub fn new(repo: &'a dyn Repository, user_id: Uuid) -> Self {
        Self { repo, user_id }
    }

    /// All of the user's tags, sorted by name (case-insensitive)
    pub fn list(&self) -> Result<Vec<Tag>> {
        let mut tags = self.repo.get_tags(self.user_id)?;
        tags.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(tags)
    }

    /// Case-insensitive name check, ignoring the tag `exclude_id`
    pub fn name_exists(&self, name: &str, exclude_id: Option<Uuid>) -> Result<bool> {
        let tags = self.repo.get_tags(self.user_id)?;
        Ok(name_taken(&tags, name, exclude_id))
    }

    pub fn create(&self, input: TagInput) -> Result<Tag> {
        let input = input.clean()?;
        let mut tags = self.repo.get_tags(self.user_id)?;
        if name_taken(&tags, &input.name, None) {
            return Err(PasswordManagerError::Duplicate(format!(
                "A tag named {} already exists",
                input.name
            )));
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: input.name,
            description: input.description,
            color: input.color,
            created_at: Utc::now(),
        };
        tags.push(tag.clone());
        self.repo.put_tags(self.user_id, &tags)?;

        info!("Created tag {} ({})", tag.name, tag.id);
        Ok(tag)
    }

    pub fn update(&self, tag_id: Uuid, input: TagInput) -> Result<Tag> {
        let input = input.clean()?;
        let mut tags = self.repo.get_tags(self.user_id)?;

        let index = tags
            .iter()
            .position(|t| t.id == tag_id)
            .ok_or_else(|| PasswordManagerError::NotFound(format!("Tag {}", tag_id)))?;
        if name_taken(&tags, &input.name, Some(tag_id)) {
            return Err(PasswordManagerError::Duplicate(format!(
                "A tag named {} already exists",
                input.name
            )));
        }

        let tag = &mut tags[index];
        tag.name = input.name;
        tag.description = input.description;
        tag.color = input.color;
        let updated = tag.clone();

        self.repo.put_tags(self.user_id, &tags)?;
        info!("Modified tag {}", tag_id);
        Ok(updated)
    }

    /// Remove a tag. Records keep the dangling id; readers skip it.
    pub fn delete(&self, tag_id: Uuid) -> Result<()> {
        let mut tags = self.repo.get_tags(self.user_id)?;
        let before = tags.len();
        tags.retain(|t| t.id != tag_id);

        if tags.len() == before {
            debug!("Delete of unknown tag {} ignored", tag_id);
            return Ok(());
        }

        self.repo.put_tags(self.user_id, &tags)?;
        info!("Deleted tag {}", tag_id);
        Ok(())
    }
}
