//! Repeating groups: an element layout plus the rule giving the element count.

use crate::schema::{fixed_size, FieldDescriptor};
use crate::value::{Fields, Value};

/// How many times a group's element repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountRule {
    /// Known when the schema is written.
    Fixed(usize),
    /// Value of an earlier unsigned field (or bitfield member) in the same scope.
    Field(String),
    /// As many whole elements as fit in the rest of the payload.
    Remainder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingGroup {
    count: CountRule,
    elements: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("count field {0} has not been decoded")]
    MissingCountField(String),
    #[error("{remaining} byte(s) left is not a multiple of element size {element_size}")]
    Misaligned { remaining: usize, element_size: usize },
}

impl RepeatingGroup {
    pub fn new(count: CountRule, elements: Vec<FieldDescriptor>) -> Self {
        RepeatingGroup { count, elements }
    }

    pub fn count(&self) -> &CountRule {
        &self.count
    }

    pub fn elements(&self) -> &[FieldDescriptor] {
        &self.elements
    }

    /// Byte size of one element, if it has no variable-length part.
    pub fn element_size(&self) -> Option<usize> {
        fixed_size(&self.elements)
    }

    /// True when the group's byte length depends on the payload.
    pub fn is_variable(&self) -> bool {
        self.fixed_size().is_none()
    }

    /// `None` for a payload-counted group, a variable element, or a size
    /// past `usize::MAX`.
    pub fn fixed_size(&self) -> Option<usize> {
        match self.count {
            CountRule::Fixed(n) => self.element_size()?.checked_mul(n),
            _ => None,
        }
    }
}

/// Number of elements to decode for `rule`, given the already decoded
/// siblings and the payload bytes still unread.
pub fn resolve_count(
    rule: &CountRule,
    siblings: &Fields,
    remaining: usize,
    element_size: Option<usize>,
) -> Result<usize, GroupError> {
    match rule {
        CountRule::Fixed(n) => Ok(*n),
        CountRule::Field(name) => siblings
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| GroupError::MissingCountField(name.clone())),
        CountRule::Remainder => {
            let element_size = element_size.unwrap_or(0);
            if element_size == 0 {
                return if remaining == 0 {
                    Ok(0)
                } else {
                    Err(GroupError::Misaligned { remaining, element_size })
                };
            }
            if remaining % element_size != 0 {
                return Err(GroupError::Misaligned { remaining, element_size });
            }
            Ok(remaining / element_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_does_not_overflow() {
        let element = vec![FieldDescriptor::scalar("x", crate::types::ScalarType::U4)];
        assert_eq!(RepeatingGroup::new(CountRule::Fixed(3), element.clone()).fixed_size(), Some(12));
        let huge = RepeatingGroup::new(CountRule::Fixed(usize::MAX), element);
        assert_eq!(huge.fixed_size(), None);
        assert!(huge.is_variable());
    }

    #[test]
    fn fixed_count_ignores_payload() {
        assert_eq!(resolve_count(&CountRule::Fixed(30), &Fields::new(), 0, Some(2)), Ok(30));
    }

    #[test]
    fn field_count_reads_sibling() {
        let mut siblings = Fields::new();
        siblings.insert("numSvs".to_string(), Value::U8(7));
        assert_eq!(
            resolve_count(&CountRule::Field("numSvs".to_string()), &siblings, 0, None),
            Ok(7)
        );
        assert_eq!(
            resolve_count(&CountRule::Field("numCh".to_string()), &siblings, 0, None),
            Err(GroupError::MissingCountField("numCh".to_string()))
        );
    }

    #[test]
    fn remainder_count_needs_whole_elements() {
        assert_eq!(resolve_count(&CountRule::Remainder, &Fields::new(), 12, Some(4)), Ok(3));
        assert_eq!(resolve_count(&CountRule::Remainder, &Fields::new(), 0, Some(4)), Ok(0));
        assert_eq!(
            resolve_count(&CountRule::Remainder, &Fields::new(), 13, Some(4)),
            Err(GroupError::Misaligned { remaining: 13, element_size: 4 })
        );
    }
}
