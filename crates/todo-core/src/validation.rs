//! Input checks applied at the create/edit boundary.
//!
//! Storage never enforces these; callers validate before writing so a
//! rejected form leaves no partial state behind.

use crate::error::{Result, TodoError};
use crate::types::TaskDraft;

/// Trim a task title and reject it if nothing is left.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TodoError::validation("title", "enter a title"));
    }
    Ok(trimmed.to_string())
}

/// Normalize a submitted task form: trimmed title and description.
pub fn validate_draft(draft: &TaskDraft) -> Result<TaskDraft> {
    let title = validate_title(&draft.title)?;
    let mut tag_ids = draft.tag_ids.clone();
    tag_ids.sort();
    tag_ids.dedup();
    Ok(TaskDraft {
        title,
        description: draft.description.trim().to_string(),
        deadline: draft.deadline,
        category_id: draft.category_id,
        tag_ids,
    })
}

/// Tag and category names must contain something besides whitespace.
pub fn validate_name(field: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TodoError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Accept `#RRGGBB`, normalized to upper case.
pub fn validate_color(color: &str) -> Result<String> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| TodoError::validation("color", "expected #RRGGBB"))?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TodoError::validation("color", "expected #RRGGBB"));
    }
    Ok(format!("#{}", hex.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagId;

    #[test]
    fn test_title_is_trimmed() {
        assert_eq!(validate_title("  Buy milk ").unwrap(), "Buy milk");
    }

    #[test]
    fn test_blank_title_rejected() {
        let err = validate_title("   \t").unwrap_err();
        assert!(matches!(err, TodoError::Validation { ref field, .. } if field == "title"));
        assert!(validate_title("").is_err());
    }

    #[test]
    fn test_draft_normalization() {
        let draft = TaskDraft {
            title: " Report ".to_string(),
            description: " quarterly \n".to_string(),
            tag_ids: vec![TagId(3), TagId(1), TagId(3)],
            ..Default::default()
        };
        let clean = validate_draft(&draft).unwrap();
        assert_eq!(clean.title, "Report");
        assert_eq!(clean.description, "quarterly");
        assert_eq!(clean.tag_ids, vec![TagId(1), TagId(3)]);
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(validate_name("tag", " Work ").unwrap(), "Work");
        assert!(validate_name("category", "  ").is_err());
    }

    #[test]
    fn test_color_validation() {
        assert_eq!(validate_color("#ff6b6b").unwrap(), "#FF6B6B");
        assert!(validate_color("FF6B6B").is_err());
        assert!(validate_color("#FF6B6").is_err());
        assert!(validate_color("#GG6B6B").is_err());
    }
}
