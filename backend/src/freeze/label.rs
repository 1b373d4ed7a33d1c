use std::fmt;

use crate::freeze::error::FreezeError;

/// Size of the label buffer, terminator included.
pub const LABEL_BUFFER_LEN: usize = 127;
pub const MAX_LABEL_LEN: usize = LABEL_BUFFER_LEN - 1;

/// The diagnostic label `<frozen NAME>` of a module being frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label(String);

impl Label {
    /// Validates `module` as a C identifier fragment and builds its label.
    pub fn for_module(module: &str) -> Result<Self, FreezeError> {
        let valid = !module.is_empty()
            && module
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            return Err(FreezeError::InvalidModuleName {
                module: module.to_string(),
            });
        }

        let label = format!("<frozen {module}>");
        if label.len() > MAX_LABEL_LEN {
            return Err(FreezeError::LabelTooLong {
                module: module.to_string(),
                len: label.len(),
            });
        }
        Ok(Label(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "<frozen " + ">" adds nine bytes.
    const LONGEST_NAME: usize = MAX_LABEL_LEN - 9;

    #[test]
    fn builds_frozen_label() {
        assert_eq!(Label::for_module("greet").unwrap().as_str(), "<frozen greet>");
    }

    #[test]
    fn label_may_fill_the_buffer() {
        let name = "m".repeat(LONGEST_NAME);
        let label = Label::for_module(&name).unwrap();
        assert_eq!(label.as_str().len(), MAX_LABEL_LEN);
    }

    #[test]
    fn one_byte_over_is_rejected() {
        let name = "m".repeat(LONGEST_NAME + 1);
        match Label::for_module(&name) {
            Err(FreezeError::LabelTooLong { len, .. }) => assert_eq!(len, LABEL_BUFFER_LEN),
            other => panic!("expected LabelTooLong, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_identifiers() {
        for name in ["", "a-b", "a.b", "a b", "é"] {
            assert!(
                matches!(
                    Label::for_module(name),
                    Err(FreezeError::InvalidModuleName { .. })
                ),
                "{name:?} should be rejected"
            );
        }
        assert!(Label::for_module("_frozen_importlib").is_ok());
    }
}
