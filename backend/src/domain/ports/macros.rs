//! Helper macro for declaring port error enums.
//!
//! Variants are either unit variants or carry a single `String` field,
//! conventionally `message`. Each gets a `snake_case` constructor; message
//! constructors accept anything convertible into `String`, so adapters can
//! write `StoreError::query(err.to_string())` or `StoreError::query("boom")`.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            #[doc = concat!("Construct [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $field:ident : String }) => {
        ::paste::paste! {
            #[doc = concat!("Construct [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]($field: impl Into<String>) -> Self {
                Self::$variant {
                    $field: $field.into(),
                }
            }
        }
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $field:ident : String $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $field: String } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $field : String } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    define_port_error! {
        pub enum ExampleStoreError {
            Unreachable => "store unreachable",
            Rejected { message: String } => "rejected: {message}",
        }
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(ExampleStoreError::unreachable(), ExampleStoreError::Unreachable);
        assert_eq!(ExampleStoreError::unreachable().to_string(), "store unreachable");
    }

    #[test]
    fn message_constructors_accept_str_and_string() {
        let borrowed = ExampleStoreError::rejected("duplicate key");
        let owned = ExampleStoreError::rejected(String::from("duplicate key"));

        assert_eq!(borrowed, owned);
        assert_eq!(borrowed.to_string(), "rejected: duplicate key");
    }
}
