use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::tokenizer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    Byte,
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Timestamp,
    Uuid,
}

impl Scalar {
    pub fn from_keyword(keyword: &str) -> Option<Scalar> {
        let scalar = match keyword {
            "byte"      => Scalar::Byte,
            "bool"      => Scalar::Bool,
            "timestamp" => Scalar::Timestamp,
            other       => return ComparableScalar::from_keyword(other).map(Scalar::from),
        };
        Some(scalar)
    }

    pub fn keyword(&self) -> &'static str {
        match self.comparable() {
            Some(c) => c.keyword(),
            None => match self {
                Scalar::Byte => "byte",
                Scalar::Bool => "bool",
                _            => "timestamp",
            },
        }
    }

    /// The comparable counterpart, if this scalar can be a map key.
    pub fn comparable(&self) -> Option<ComparableScalar> {
        let c = match self {
            Scalar::UInt8   => ComparableScalar::UInt8,
            Scalar::UInt16  => ComparableScalar::UInt16,
            Scalar::UInt32  => ComparableScalar::UInt32,
            Scalar::UInt64  => ComparableScalar::UInt64,
            Scalar::Int8    => ComparableScalar::Int8,
            Scalar::Int16   => ComparableScalar::Int16,
            Scalar::Int32   => ComparableScalar::Int32,
            Scalar::Int64   => ComparableScalar::Int64,
            Scalar::Float32 => ComparableScalar::Float32,
            Scalar::Float64 => ComparableScalar::Float64,
            Scalar::String  => ComparableScalar::String,
            Scalar::Uuid    => ComparableScalar::Uuid,
            Scalar::Byte | Scalar::Bool | Scalar::Timestamp => return None,
        };
        Some(c)
    }
}

/// Scalars usable as map keys, typedef targets and const types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparableScalar {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Uuid,
}

impl ComparableScalar {
    pub fn from_keyword(keyword: &str) -> Option<ComparableScalar> {
        let c = match keyword {
            "uint8"   => ComparableScalar::UInt8,
            "uint16"  => ComparableScalar::UInt16,
            "uint32"  => ComparableScalar::UInt32,
            "uint64"  => ComparableScalar::UInt64,
            "int8"    => ComparableScalar::Int8,
            "int16"   => ComparableScalar::Int16,
            "int32"   => ComparableScalar::Int32,
            "int64"   => ComparableScalar::Int64,
            "float32" => ComparableScalar::Float32,
            "float64" => ComparableScalar::Float64,
            "string"  => ComparableScalar::String,
            "uuid"    => ComparableScalar::Uuid,
            _ => return None,
        };
        Some(c)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ComparableScalar::UInt8   => "uint8",
            ComparableScalar::UInt16  => "uint16",
            ComparableScalar::UInt32  => "uint32",
            ComparableScalar::UInt64  => "uint64",
            ComparableScalar::Int8    => "int8",
            ComparableScalar::Int16   => "int16",
            ComparableScalar::Int32   => "int32",
            ComparableScalar::Int64   => "int64",
            ComparableScalar::Float32 => "float32",
            ComparableScalar::Float64 => "float64",
            ComparableScalar::String  => "string",
            ComparableScalar::Uuid    => "uuid",
        }
    }
}

impl From<ComparableScalar> for Scalar {
    fn from(c: ComparableScalar) -> Scalar {
        match c {
            ComparableScalar::UInt8   => Scalar::UInt8,
            ComparableScalar::UInt16  => Scalar::UInt16,
            ComparableScalar::UInt32  => Scalar::UInt32,
            ComparableScalar::UInt64  => Scalar::UInt64,
            ComparableScalar::Int8    => Scalar::Int8,
            ComparableScalar::Int16   => Scalar::Int16,
            ComparableScalar::Int32   => Scalar::Int32,
            ComparableScalar::Int64   => Scalar::Int64,
            ComparableScalar::Float32 => Scalar::Float32,
            ComparableScalar::Float64 => Scalar::Float64,
            ComparableScalar::String  => Scalar::String,
            ComparableScalar::Uuid    => Scalar::Uuid,
        }
    }
}

/// A reference to a message, enum, typedef or stream by name.
///
/// `package` is empty until the file assembler qualifies the reference with
/// the file's own package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomType {
    pub name:     String,
    pub package:  String,
    pub imported: bool,
    #[serde(skip)]
    pub token:    Token,
}

impl CustomType {
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    /// Defaults an omitted package to `file_package` and sets `imported`.
    pub fn qualify(&mut self, file_package: &str) {
        if self.package.is_empty() {
            self.package = file_package.to_string();
        }
        self.imported = self.package != file_package;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataType {
    Scalar(Scalar),
    List(Box<DataType>),
    Map(ComparableType, Box<DataType>),
    Custom(CustomType),
}

impl DataType {
    /// Strips list and map layers down to the innermost value type.
    pub fn element_type(&self) -> &DataType {
        match self {
            DataType::List(inner) | DataType::Map(_, inner) => inner.element_type(),
            other => other,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomType> {
        match self {
            DataType::Custom(c) => Some(c),
            _ => None,
        }
    }

    /// Every custom type referenced anywhere in this type, map keys included.
    pub fn custom_types(&self) -> Vec<&CustomType> {
        let mut out = Vec::new();
        self.collect_custom_types(&mut out);
        out
    }

    fn collect_custom_types<'a>(&'a self, out: &mut Vec<&'a CustomType>) {
        match self {
            DataType::Scalar(_) => {}
            DataType::List(inner) => inner.collect_custom_types(out),
            DataType::Map(key, value) => {
                if let ComparableType::Custom(c) = key {
                    out.push(c);
                }
                value.collect_custom_types(out);
            }
            DataType::Custom(c) => out.push(c),
        }
    }

    pub fn for_each_custom_mut<F: FnMut(&mut CustomType)>(&mut self, f: &mut F) {
        match self {
            DataType::Scalar(_) => {}
            DataType::List(inner) => inner.for_each_custom_mut(f),
            DataType::Map(key, value) => {
                if let ComparableType::Custom(c) = key {
                    f(c);
                }
                value.for_each_custom_mut(f);
            }
            DataType::Custom(c) => f(c),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Scalar(s)        => f.write_str(s.keyword()),
            DataType::List(inner)      => write!(f, "list<{}>", inner),
            DataType::Map(key, value)  => write!(f, "map<{}, {}>", key, value),
            DataType::Custom(c)        => f.write_str(&c.qualified_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ComparableType {
    Scalar(ComparableScalar),
    Custom(CustomType),
}

impl ComparableType {
    pub fn as_custom(&self) -> Option<&CustomType> {
        match self {
            ComparableType::Custom(c) => Some(c),
            ComparableType::Scalar(_) => None,
        }
    }
}

impl fmt::Display for ComparableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparableType::Scalar(s) => f.write_str(s.keyword()),
            ComparableType::Custom(c) => f.write_str(&c.qualified_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageDeclaration {
    pub name:  String,
    #[serde(skip)]
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedefDeclaration {
    pub name:       String,
    pub underlying: ComparableScalar,
    #[serde(skip)]
    pub token:      Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstDeclaration {
    pub name:       String,
    pub value:      String,
    pub data_type:  ComparableType,
    /// Set by the resolver when `data_type` is a typedef alias.
    pub underlying: Option<ComparableScalar>,
    #[serde(skip)]
    pub token:      Token,
    #[serde(skip)]
    pub value_token: Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumValueDefinition {
    pub name:  String,
    pub index: u32,
    pub value: Option<String>,
    #[serde(skip)]
    pub token: Token,
}

impl EnumValueDefinition {
    /// The quoted display value, or the identifier when none was given.
    pub fn display_value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDefinition {
    pub name:   String,
    pub values: BTreeMap<String, EnumValueDefinition>,
    #[serde(skip)]
    pub token:  Token,
}

impl EnumDefinition {
    pub fn values_by_index(&self) -> Vec<&EnumValueDefinition> {
        let mut values: Vec<_> = self.values.values().collect();
        values.sort_by_key(|v| v.index);
        values
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub name:      String,
    pub index:     u32,
    pub data_type: DataType,
    #[serde(skip)]
    pub token:     Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDefinition {
    pub name:   String,
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(skip)]
    pub token:  Token,
}

impl MessageDefinition {
    pub fn fields_by_index(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<_> = self.fields.values().collect();
        fields.sort_by_key(|f| f.index);
        fields
    }
}

/// What a service method answers with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MethodReturn {
    Message(DataType),
    /// `returns (stream Name)`: the call opens the named stream.
    Stream(CustomType),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMethodDefinition {
    pub name:     String,
    pub argument: DataType,
    pub returns:  MethodReturn,
    #[serde(skip)]
    pub token:    Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDefinition {
    pub name:    String,
    pub methods: BTreeMap<String, ServiceMethodDefinition>,
    #[serde(skip)]
    pub token:   Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamDirection {
    /// Sent by the client, handled by the server.
    Client,
    /// Sent by the server, handled by the client.
    Server,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamMethodDefinition {
    pub name:      String,
    pub direction: StreamDirection,
    pub argument:  DataType,
    pub returns:   DataType,
    #[serde(skip)]
    pub token:     Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDefinition {
    pub name:    String,
    pub methods: BTreeMap<String, StreamMethodDefinition>,
    #[serde(skip)]
    pub token:   Token,
}
