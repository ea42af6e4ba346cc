use crate::model::{Question, SectionId};

/// Questions of one section, as positions in the session's question list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionGroup {
    pub section_id: SectionId,
    pub indices: Vec<usize>,
}

impl SectionGroup {
    #[must_use]
    pub fn first_index(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }
}

/// Partition questions by section, keeping sections in first-seen order.
///
/// Questions without a section land in the `general` bucket.
#[must_use]
pub fn group_by_section(questions: &[Question]) -> Vec<SectionGroup> {
    let mut groups: Vec<SectionGroup> = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        let section_id = question.section_or_general();
        match groups.iter_mut().find(|g| g.section_id == section_id) {
            Some(group) => group.indices.push(index),
            None => groups.push(SectionGroup {
                section_id,
                indices: vec![index],
            }),
        }
    }
    groups
}
