//! Replace-the-collection semantics for nested child records.
//!
//! Submitted entries carrying an id update the matching existing record, entries
//! without an id are created, and existing records absent from the submission are
//! dropped.

use super::IdSource;

/// A child record that can be updated in place from its input representation.
pub trait NestedRecord: Sized {
    type Input;

    fn record_id(&self) -> u64;
    fn input_id(input: &Self::Input) -> Option<u64>;
    fn create(id: u64, input: Self::Input, ids: &dyn IdSource) -> Result<Self, NestedError>;
    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NestedError {
    #[error("{entity} {id} does not belong to this record")]
    UnknownId { entity: &'static str, id: u64 },
    #[error("{0}")]
    Invalid(String),
}

/// Merge `inputs` into `existing`, returning the new collection in input order.
pub fn merge_nested<T>(
    entity: &'static str,
    existing: Vec<T>,
    inputs: Vec<T::Input>,
    ids: &dyn IdSource,
) -> Result<Vec<T>, NestedError>
where
    T: NestedRecord,
{
    let mut pool: Vec<Option<T>> = existing.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(inputs.len());

    for input in inputs {
        match T::input_id(&input) {
            Some(id) => {
                let mut record = pool
                    .iter_mut()
                    .find(|slot| slot.as_ref().is_some_and(|record| record.record_id() == id))
                    .and_then(Option::take)
                    .ok_or(NestedError::UnknownId { entity, id })?;
                record.apply(input, ids)?;
                merged.push(record);
            }
            None => merged.push(T::create(ids.next_id(), input, ids)?),
        }
    }

    Ok(merged)
}

/// Builds fresh records for a collection that had no previous state.
pub fn create_nested<T>(inputs: Vec<T::Input>, ids: &dyn IdSource) -> Result<Vec<T>, NestedError>
where
    T: NestedRecord,
{
    inputs
        .into_iter()
        .map(|input| T::create(ids.next_id(), input, ids))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counter starting after `start`.
    pub(crate) struct Counter(AtomicU64);

    impl Counter {
        pub(crate) fn starting_at(start: u64) -> Self {
            Self(AtomicU64::new(start))
        }
    }

    impl IdSource for Counter {
        fn next_id(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[derive(Debug, PartialEq)]
    struct Link {
        id: u64,
        url: String,
    }

    struct LinkInput {
        id: Option<u64>,
        url: String,
    }

    impl NestedRecord for Link {
        type Input = LinkInput;

        fn record_id(&self) -> u64 {
            self.id
        }

        fn input_id(input: &LinkInput) -> Option<u64> {
            input.id
        }

        fn create(id: u64, input: LinkInput, _ids: &dyn IdSource) -> Result<Self, NestedError> {
            Ok(Link { id, url: input.url })
        }

        fn apply(&mut self, input: LinkInput, _ids: &dyn IdSource) -> Result<(), NestedError> {
            self.url = input.url;
            Ok(())
        }
    }

    fn link(id: u64, url: &str) -> Link {
        Link {
            id,
            url: url.to_string(),
        }
    }

    fn input(id: Option<u64>, url: &str) -> LinkInput {
        LinkInput {
            id,
            url: url.to_string(),
        }
    }

    #[test]
    fn updates_creates_and_drops() {
        let existing = vec![link(1, "a"), link(2, "b"), link(3, "c")];
        let merged = merge_nested(
            "link",
            existing,
            vec![input(Some(3), "c2"), input(None, "new"), input(Some(1), "a")],
            &Counter::starting_at(10),
        )
        .expect("merge succeeds");

        assert_eq!(merged, vec![link(3, "c2"), link(11, "new"), link(1, "a")]);
    }

    #[test]
    fn rejects_ids_that_are_not_children() {
        let result = merge_nested(
            "link",
            vec![link(1, "a")],
            vec![input(Some(7), "x")],
            &Counter::starting_at(0),
        );
        assert_eq!(
            result,
            Err(NestedError::UnknownId {
                entity: "link",
                id: 7
            })
        );
    }

    #[test]
    fn duplicate_ids_in_one_submission_are_rejected() {
        let result = merge_nested(
            "link",
            vec![link(1, "a")],
            vec![input(Some(1), "x"), input(Some(1), "y")],
            &Counter::starting_at(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let created: Vec<Link> = create_nested(
            vec![input(None, "a"), input(Some(99), "b")],
            &Counter::starting_at(4),
        )
        .expect("create succeeds");
        assert_eq!(created, vec![link(5, "a"), link(6, "b")]);
    }
}
