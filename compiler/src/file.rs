use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::{
    error::ParseError,
    parser::{
        parse_const_declarations, parse_enum_definitions, parse_message_definitions,
        parse_package_declaration, parse_service_definitions, parse_stream_definitions,
        parse_typedef_declarations,
    },
    tokenizer::{tokenize_file, Token},
    types::{
        ComparableType, ConstDeclaration, CustomType, EnumDefinition, MessageDefinition,
        MethodReturn, PackageDeclaration, ServiceDefinition, StreamDefinition, TypedefDeclaration,
    },
};

/// A reference from this file to a type it does not define itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomTypeDependency {
    pub package: String,
    pub name:    String,
    #[serde(skip)]
    pub token:   Token,
    /// Key of the defining file, bound by the resolver.
    pub file:    Option<String>,
}

impl CustomTypeDependency {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// A resolved edge to another file, with the token that first caused it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileDependency<'a> {
    pub file:  &'a str,
    pub token: &'a Token,
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct File {
    pub name:         String,
    pub path:         String,
    #[serde(skip)]
    pub content:      String,
    pub package:      PackageDeclaration,
    /// Keyed by qualified name; the first reference wins.
    pub dependencies: BTreeMap<String, CustomTypeDependency>,
    pub typedefs:     BTreeMap<String, TypedefDeclaration>,
    pub consts:       BTreeMap<String, ConstDeclaration>,
    pub enums:        BTreeMap<String, EnumDefinition>,
    pub messages:     BTreeMap<String, MessageDefinition>,
    pub services:     BTreeMap<String, ServiceDefinition>,
    pub streams:      BTreeMap<String, StreamDefinition>,
}

impl File {
    pub fn package_name(&self) -> &str {
        &self.package.name
    }

    /// Whether this file declares `name`, of any kind.
    pub fn defines(&self, name: &str) -> bool {
        self.typedefs.contains_key(name)
            || self.consts.contains_key(name)
            || self.enums.contains_key(name)
            || self.messages.contains_key(name)
            || self.services.contains_key(name)
            || self.streams.contains_key(name)
    }

    /// Every custom type referenced by a declaration in this file.
    pub fn custom_type_references(&self) -> Vec<&CustomType> {
        let mut refs = Vec::new();
        for c in self.consts.values() {
            if let ComparableType::Custom(custom) = &c.data_type {
                refs.push(custom);
            }
        }
        for message in self.messages.values() {
            for field in message.fields.values() {
                refs.extend(field.data_type.custom_types());
            }
        }
        for service in self.services.values() {
            for method in service.methods.values() {
                refs.extend(method.argument.custom_types());
                match &method.returns {
                    MethodReturn::Message(data_type) => refs.extend(data_type.custom_types()),
                    MethodReturn::Stream(stream) => refs.push(stream),
                }
            }
        }
        for stream in self.streams.values() {
            for method in stream.methods.values() {
                refs.extend(method.argument.custom_types());
                refs.extend(method.returns.custom_types());
            }
        }
        refs
    }

    /// Distinct foreign packages this file references, with the first token.
    pub fn package_dependencies(&self) -> BTreeMap<&str, &Token> {
        let mut packages = BTreeMap::new();
        for dep in self.dependencies.values() {
            if dep.package != self.package.name {
                packages.entry(dep.package.as_str()).or_insert(&dep.token);
            }
        }
        packages
    }

    /// Distinct other files this file depends on. Only meaningful after the
    /// resolver has bound each dependency to its defining file.
    pub fn file_dependencies(&self) -> Vec<FileDependency<'_>> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for dep in self.dependencies.values() {
            if let Some(file) = dep.file.as_deref() {
                if file != self.path && seen.insert(file) {
                    out.push(FileDependency { file, token: &dep.token });
                }
            }
        }
        out
    }

    /// Messages ordered so that each follows every same-file message it
    /// embeds. Ties are broken by name.
    pub fn messages_sorted_by_dependencies(&self) -> Vec<&MessageDefinition> {
        let mut incoming: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for message in self.messages.values() {
            incoming.entry(&message.name).or_insert(0);
            let embedded: BTreeSet<&str> = message
                .fields
                .values()
                .flat_map(|f| f.data_type.custom_types())
                .filter(|c| c.package == self.package.name && self.messages.contains_key(&c.name))
                .map(|c| c.name.as_str())
                .filter(|name| *name != message.name)
                .collect();
            for name in embedded {
                *incoming.entry(&message.name).or_insert(0) += 1;
                dependents.entry(name).or_default().push(&message.name);
            }
        }

        let mut ready: BTreeSet<&str> = incoming
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut ordered = Vec::with_capacity(self.messages.len());

        while let Some(name) = ready.pop_first() {
            if let Some(message) = self.messages.get(name) {
                ordered.push(message);
            }
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = incoming.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        // Unresolved input may still contain cycles; keep those messages in name order.
        if ordered.len() < self.messages.len() {
            for message in self.messages.values() {
                if !ordered.iter().any(|m| m.name == message.name) {
                    ordered.push(message);
                }
            }
        }
        ordered
    }
}

/// Tokenizes and parses one file, qualifies every custom type reference with
/// the file's package, and collects external dependencies.
///
/// `path` is the file's key (its path relative to the input root). Errors
/// carry `path` and `content` for rendering.
pub fn parse_file_content(path: &str, content: &str) -> Result<File, ParseError> {
    parse_file_inner(path, content).map_err(|e| e.in_file(path, content))
}

fn parse_file_inner(path: &str, content: &str) -> Result<File, ParseError> {
    let tokens = tokenize_file(content)?;

    let package = parse_package_declaration(&tokens)?;
    let mut file = File {
        name:         Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        path:         path.to_string(),
        content:      content.to_string(),
        dependencies: BTreeMap::new(),
        typedefs:     parse_typedef_declarations(&tokens)?,
        consts:       parse_const_declarations(&tokens)?,
        enums:        parse_enum_definitions(&tokens)?,
        messages:     parse_message_definitions(&tokens)?,
        services:     parse_service_definitions(&tokens)?,
        streams:      parse_stream_definitions(&tokens)?,
        package,
    };

    qualify_references(&mut file);
    file.dependencies = collect_dependencies(&file);

    debug!(
        file = %file.path,
        package = %file.package.name,
        dependencies = file.dependencies.len(),
        "parsed file"
    );
    Ok(file)
}

fn qualify_references(file: &mut File) {
    let package = file.package.name.clone();
    let mut qualify = |custom: &mut CustomType| custom.qualify(&package);

    for c in file.consts.values_mut() {
        if let ComparableType::Custom(custom) = &mut c.data_type {
            qualify(custom);
        }
    }
    for message in file.messages.values_mut() {
        for field in message.fields.values_mut() {
            field.data_type.for_each_custom_mut(&mut qualify);
        }
    }
    for service in file.services.values_mut() {
        for method in service.methods.values_mut() {
            method.argument.for_each_custom_mut(&mut qualify);
            match &mut method.returns {
                MethodReturn::Message(data_type) => data_type.for_each_custom_mut(&mut qualify),
                MethodReturn::Stream(stream) => qualify(stream),
            }
        }
    }
    for stream in file.streams.values_mut() {
        for method in stream.methods.values_mut() {
            method.argument.for_each_custom_mut(&mut qualify);
            method.returns.for_each_custom_mut(&mut qualify);
        }
    }
}

/// A reference is external unless it names a declaration of this file in
/// this file's package.
fn collect_dependencies(file: &File) -> BTreeMap<String, CustomTypeDependency> {
    let mut dependencies = BTreeMap::new();
    for custom in file.custom_type_references() {
        if custom.package == file.package.name && file.defines(&custom.name) {
            continue;
        }
        dependencies
            .entry(custom.qualified_name())
            .or_insert_with(|| CustomTypeDependency {
                package: custom.package.clone(),
                name:    custom.name.clone(),
                token:   custom.token.clone(),
                file:    None,
            });
    }
    dependencies
}
