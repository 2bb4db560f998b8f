use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::{
    error::ParseError,
    file::File,
    tokenizer::Token,
    traits::Declaration,
    types::{
        ConstDeclaration, EnumDefinition, MessageDefinition, PackageDeclaration,
        ServiceDefinition, StreamDefinition, TypedefDeclaration,
    },
    utils::{hash_string_to_u64, quote},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Typedef,
    Const,
    Enum,
    Message,
    Service,
    Stream,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DeclarationKind::Typedef => TypedefDeclaration::KIND,
            DeclarationKind::Const   => ConstDeclaration::KIND,
            DeclarationKind::Enum    => EnumDefinition::KIND,
            DeclarationKind::Message => MessageDefinition::KIND,
            DeclarationKind::Service => ServiceDefinition::KIND,
            DeclarationKind::Stream  => StreamDefinition::KIND,
        };
        f.write_str(kind)
    }
}

/// A package referenced by one of this package's files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageDependency {
    pub package: String,
    /// Key of the file holding the first reference.
    pub file:    String,
    #[serde(skip)]
    pub token:   Token,
}

/// Hash-to-name table that rejects two names landing on the same ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdTable {
    entries: BTreeMap<u64, String>,
}

impl IdTable {
    /// Records `name` under `id`. Claiming the same name twice is a no-op;
    /// a different name already holding `id` is returned as the error.
    pub fn claim(&mut self, id: u64, name: &str) -> Result<(), String> {
        match self.entries.get(&id) {
            Some(existing) if existing != name => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(id, name.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wire IDs for services, streams and their methods. Method tables are keyed
/// by the owning service or stream ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WireIds {
    pub services:       IdTable,
    pub methods:        BTreeMap<u64, IdTable>,
    pub streams:        IdTable,
    pub stream_methods: BTreeMap<u64, IdTable>,
}

/// All files sharing one package name. Declaration maps hold the key of the
/// defining file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub name:         String,
    #[serde(skip)]
    pub declaration:  PackageDeclaration,
    pub files:        Vec<String>,
    pub dependencies: BTreeMap<String, PackageDependency>,
    pub typedefs:     BTreeMap<String, String>,
    pub consts:       BTreeMap<String, String>,
    pub enums:        BTreeMap<String, String>,
    pub messages:     BTreeMap<String, String>,
    pub services:     BTreeMap<String, String>,
    pub streams:      BTreeMap<String, String>,
    pub wire_ids:     WireIds,
}

impl Package {
    fn new(declaration: &PackageDeclaration) -> Self {
        Package {
            name:         declaration.name.clone(),
            declaration:  declaration.clone(),
            files:        Vec::new(),
            dependencies: BTreeMap::new(),
            typedefs:     BTreeMap::new(),
            consts:       BTreeMap::new(),
            enums:        BTreeMap::new(),
            messages:     BTreeMap::new(),
            services:     BTreeMap::new(),
            streams:      BTreeMap::new(),
            wire_ids:     WireIds::default(),
        }
    }

    /// The file declaring `name`, whatever kind of declaration it is.
    pub fn defining_file(&self, name: &str) -> Option<&str> {
        [
            &self.typedefs,
            &self.consts,
            &self.enums,
            &self.messages,
            &self.services,
            &self.streams,
        ]
        .into_iter()
        .find_map(|map| map.get(name))
        .map(String::as_str)
    }

    pub fn declaration_kind(&self, name: &str) -> Option<DeclarationKind> {
        [
            (&self.typedefs, DeclarationKind::Typedef),
            (&self.consts,   DeclarationKind::Const),
            (&self.enums,    DeclarationKind::Enum),
            (&self.messages, DeclarationKind::Message),
            (&self.services, DeclarationKind::Service),
            (&self.streams,  DeclarationKind::Stream),
        ]
        .into_iter()
        .find(|(map, _)| map.contains_key(name))
        .map(|(_, kind)| kind)
    }

    pub fn assign_service_id(&mut self, service: &str, token: &Token) -> Result<u64, ParseError> {
        let id = hash_string_to_u64(service);
        claim(&mut self.wire_ids.services, id, service, "ServiceID", token)?;
        Ok(id)
    }

    pub fn assign_method_id(&mut self, service: &str, method: &str, token: &Token) -> Result<u64, ParseError> {
        let service_id = hash_string_to_u64(service);
        let id = hash_string_to_u64(method);
        let table = self.wire_ids.methods.entry(service_id).or_default();
        claim(table, id, method, "MethodID", token)?;
        Ok(id)
    }

    pub fn assign_stream_id(&mut self, stream: &str, token: &Token) -> Result<u64, ParseError> {
        let id = hash_string_to_u64(stream);
        claim(&mut self.wire_ids.streams, id, stream, "StreamID", token)?;
        Ok(id)
    }

    pub fn assign_stream_method_id(&mut self, stream: &str, method: &str, token: &Token) -> Result<u64, ParseError> {
        let stream_id = hash_string_to_u64(stream);
        let id = hash_string_to_u64(method);
        let table = self.wire_ids.stream_methods.entry(stream_id).or_default();
        claim(table, id, method, "StreamMethodID", token)?;
        Ok(id)
    }

    /// The wire ID of `service`, once the resolver has assigned it.
    pub fn hash_to_service_id(&self, service: &str) -> Option<u64> {
        let id = hash_string_to_u64(service);
        (self.wire_ids.services.get(id) == Some(service)).then_some(id)
    }

    pub fn hash_to_method_id(&self, service: &str, method: &str) -> Option<u64> {
        let service_id = self.hash_to_service_id(service)?;
        let id = hash_string_to_u64(method);
        let table = self.wire_ids.methods.get(&service_id)?;
        (table.get(id) == Some(method)).then_some(id)
    }

    pub fn hash_to_stream_id(&self, stream: &str) -> Option<u64> {
        let id = hash_string_to_u64(stream);
        (self.wire_ids.streams.get(id) == Some(stream)).then_some(id)
    }

    pub fn hash_to_stream_method_id(&self, stream: &str, method: &str) -> Option<u64> {
        let stream_id = self.hash_to_stream_id(stream)?;
        let id = hash_string_to_u64(method);
        let table = self.wire_ids.stream_methods.get(&stream_id)?;
        (table.get(id) == Some(method)).then_some(id)
    }
}

fn claim(table: &mut IdTable, id: u64, name: &str, what: &str, token: &Token) -> Result<(), ParseError> {
    table.claim(id, name).map_err(|existing| {
        ParseError::graph(
            format!(
                "{} collision detected: {} and {} both hash to {}",
                what,
                quote(&existing),
                quote(name),
                id
            ),
            Some(token),
        )
    })
}

/// Every file and package of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parse {
    pub files:    BTreeMap<String, File>,
    pub packages: BTreeMap<String, Package>,
}

impl Parse {
    /// The file declaring `package.name`, if any.
    pub fn defining_file(&self, package: &str, name: &str) -> Option<&File> {
        let file = self.packages.get(package)?.defining_file(name)?;
        self.files.get(file)
    }

    pub fn message(&self, package: &str, name: &str) -> Option<&MessageDefinition> {
        self.defining_file(package, name)?.messages.get(name)
    }

    pub fn enum_definition(&self, package: &str, name: &str) -> Option<&EnumDefinition> {
        self.defining_file(package, name)?.enums.get(name)
    }

    pub fn typedef(&self, package: &str, name: &str) -> Option<&TypedefDeclaration> {
        self.defining_file(package, name)?.typedefs.get(name)
    }

    pub fn const_declaration(&self, package: &str, name: &str) -> Option<&ConstDeclaration> {
        self.defining_file(package, name)?.consts.get(name)
    }

    pub fn service(&self, package: &str, name: &str) -> Option<&ServiceDefinition> {
        self.defining_file(package, name)?.services.get(name)
    }

    pub fn stream(&self, package: &str, name: &str) -> Option<&StreamDefinition> {
        self.defining_file(package, name)?.streams.get(name)
    }
}

/// Adds one kind of declaration to the package namespace, rejecting any name
/// already taken by a declaration of any kind.
fn merge<D: Declaration>(
    package:   &mut Package,
    select:    fn(&mut Package) -> &mut BTreeMap<String, String>,
    decls:     &BTreeMap<String, D>,
    file_key:  &str,
) -> Result<(), ParseError> {
    for decl in decls.values() {
        if let Some(existing) = package.defining_file(decl.name()) {
            let message = if existing == file_key {
                format!("{} defined multiple times", quote(decl.name()))
            } else {
                format!("{} defined multiple times, also in {}", quote(decl.name()), existing)
            };
            return Err(ParseError::semantic(message, decl.token()));
        }
        select(package).insert(decl.name().to_string(), file_key.to_string());
    }
    Ok(())
}

fn merge_file(package: &mut Package, file: &File) -> Result<(), ParseError> {
    merge(package, |p| &mut p.typedefs, &file.typedefs, &file.path)?;
    merge(package, |p| &mut p.consts, &file.consts, &file.path)?;
    merge(package, |p| &mut p.enums, &file.enums, &file.path)?;
    merge(package, |p| &mut p.messages, &file.messages, &file.path)?;
    merge(package, |p| &mut p.services, &file.services, &file.path)?;
    merge(package, |p| &mut p.streams, &file.streams, &file.path)?;

    for (dependency, token) in file.package_dependencies() {
        package
            .dependencies
            .entry(dependency.to_string())
            .or_insert_with(|| PackageDependency {
                package: dependency.to_string(),
                file:    file.path.clone(),
                token:   token.clone(),
            });
    }
    package.files.push(file.path.clone());
    Ok(())
}

/// Groups parsed files by package and merges their declarations.
pub fn assemble_packages(files: BTreeMap<String, File>) -> Result<Parse, ParseError> {
    let mut packages: BTreeMap<String, Package> = BTreeMap::new();

    for file in files.values() {
        let package = packages
            .entry(file.package.name.clone())
            .or_insert_with(|| Package::new(&file.package));
        merge_file(package, file).map_err(|e| e.in_file(&file.path, &file.content))?;
    }

    debug!(files = files.len(), packages = packages.len(), "assembled packages");
    Ok(Parse { files, packages })
}
