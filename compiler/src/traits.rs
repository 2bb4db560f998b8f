use crate::tokenizer::Token;
use crate::types::{
    ConstDeclaration, EnumDefinition, MessageDefinition, ServiceDefinition, StreamDefinition,
    TypedefDeclaration,
};

/// A named top-level declaration that lives in a package namespace.
pub trait Declaration {
    /// Human-readable kind, used in diagnostics.
    const KIND: &'static str;

    fn name(&self) -> &str;
    fn token(&self) -> &Token;
}

macro_rules! impl_declaration {
    ($ty:ty, $kind:expr) => {
        impl Declaration for $ty {
            const KIND: &'static str = $kind;

            fn name(&self) -> &str {
                &self.name
            }

            fn token(&self) -> &Token {
                &self.token
            }
        }
    };
}

impl_declaration!(TypedefDeclaration, "typedef");
impl_declaration!(ConstDeclaration, "const");
impl_declaration!(EnumDefinition, "enum");
impl_declaration!(MessageDefinition, "message");
impl_declaration!(ServiceDefinition, "service");
impl_declaration!(StreamDefinition, "stream");
