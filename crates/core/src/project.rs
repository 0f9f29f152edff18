//! Project identifier validation.

/// Longest project identifier accepted.
pub const PROJECT_MAX_LENGTH: usize = 40;

/// Error returned for a malformed project identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectError {
    #[error("project must be specified")]
    Empty,
    #[error("project {project:?} is longer than 40 characters")]
    TooLong { project: String },
    #[error("project {project:?} contains invalid character {ch:?}")]
    InvalidCharacter { project: String, ch: char },
}

/// Validate a project identifier against `^[a-z0-9\-]{1,40}$`.
pub fn validate_project(project: &str) -> Result<(), ProjectError> {
    if project.is_empty() {
        return Err(ProjectError::Empty);
    }
    if project.len() > PROJECT_MAX_LENGTH {
        return Err(ProjectError::TooLong {
            project: project.to_string(),
        });
    }
    if let Some(ch) = project
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(ProjectError::InvalidCharacter {
            project: project.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Convenience wrapper around [`validate_project`].
pub fn is_valid_project(project: &str) -> bool {
    validate_project(project).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_digits_and_dashes() {
        assert!(is_valid_project("chromium"));
        assert!(is_valid_project("project-b"));
        assert!(is_valid_project("v8"));
        assert!(is_valid_project(&"a".repeat(PROJECT_MAX_LENGTH)));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validate_project(""), Err(ProjectError::Empty));
    }

    #[test]
    fn rejects_bad_characters() {
        assert!(matches!(
            validate_project("!"),
            Err(ProjectError::InvalidCharacter { ch: '!', .. })
        ));
        assert!(!is_valid_project("Chromium"));
        assert!(!is_valid_project("my_project"));
        assert!(!is_valid_project("has space"));
    }

    #[test]
    fn rejects_overlong() {
        let long = "a".repeat(PROJECT_MAX_LENGTH + 1);
        assert!(matches!(
            validate_project(&long),
            Err(ProjectError::TooLong { .. })
        ));
    }
}
