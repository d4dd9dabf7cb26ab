/// Declares a numeric record identifier that serializes as a bare integer.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

/// Implements `NestedRecord` for a child record whose update replaces every field.
macro_rules! replace_nested {
    ($record:ty, $input:ty, |$id:ident, $source:ident| $build:expr) => {
        impl $crate::store::NestedRecord for $record {
            type Input = $input;

            fn record_id(&self) -> u64 {
                self.id.0
            }

            fn input_id(input: &Self::Input) -> Option<u64> {
                input.id.map(|id| id.0)
            }

            fn create(
                $id: u64,
                $source: Self::Input,
                _ids: &dyn $crate::store::IdSource,
            ) -> Result<Self, $crate::store::NestedError> {
                Ok($build)
            }

            fn apply(
                &mut self,
                input: Self::Input,
                ids: &dyn $crate::store::IdSource,
            ) -> Result<(), $crate::store::NestedError> {
                *self = <Self as $crate::store::NestedRecord>::create(self.id.0, input, ids)?;
                Ok(())
            }
        }
    };
}
