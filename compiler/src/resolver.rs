use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::{
    error::ParseError,
    file::File,
    literal::validate_literal,
    processor::{DeclarationKind, Package, Parse},
    tokenizer::Token,
    types::{ComparableType, CustomType, DataType, MessageDefinition, MethodReturn},
    utils::quote,
};

/// Binds every reference and validates the whole compilation.
///
/// Runs in order: dependency binding, type-kind and cycle checks, re-validation
/// of consts typed by a custom name, and wire-ID assignment. The first failure
/// is returned with its file context attached.
pub fn resolve(parse: &mut Parse) -> Result<(), ParseError> {
    bind_dependencies(parse)?;

    for file in parse.files.values() {
        check_type_kinds(parse, file).map_err(|e| e.in_file(&file.path, &file.content))?;
    }
    check_message_cycles(parse)?;
    check_file_cycles(parse)?;
    check_package_cycles(parse)?;

    resolve_consts(parse)?;
    assign_wire_ids(parse)?;

    debug!(files = parse.files.len(), packages = parse.packages.len(), "resolved");
    Ok(())
}

/// Points each external dependency at the file that defines it.
fn bind_dependencies(parse: &mut Parse) -> Result<(), ParseError> {
    let Parse { files, packages } = parse;

    for file in files.values_mut() {
        let (path, content) = (file.path.clone(), file.content.clone());
        for dependency in file.dependencies.values_mut() {
            let Some(package) = packages.get(&dependency.package) else {
                return Err(ParseError::semantic(
                    format!("package {} not found", quote(&dependency.package)),
                    &dependency.token,
                )
                .in_file(&path, &content));
            };

            let bound = match package.declaration_kind(&dependency.name) {
                Some(DeclarationKind::Message)
                | Some(DeclarationKind::Enum)
                | Some(DeclarationKind::Typedef)
                | Some(DeclarationKind::Stream) => package.defining_file(&dependency.name),
                _ => None,
            };
            let Some(defining) = bound else {
                return Err(ParseError::semantic(
                    format!("type {} not found", quote(&dependency.qualified_name())),
                    &dependency.token,
                )
                .in_file(&path, &content));
            };

            trace!(file = %path, dependency = %dependency.qualified_name(), defined_in = defining, "bound dependency");
            dependency.file = Some(defining.to_string());
        }
    }
    Ok(())
}

fn kind_of(parse: &Parse, custom: &CustomType) -> Result<DeclarationKind, ParseError> {
    parse
        .packages
        .get(&custom.package)
        .and_then(|p| p.declaration_kind(&custom.name))
        .ok_or_else(|| {
            ParseError::semantic(format!("type {} not found", quote(&custom.qualified_name())), &custom.token)
        })
}

fn expect_kind(parse: &Parse, custom: &CustomType, allowed: &[DeclarationKind], role: &str) -> Result<(), ParseError> {
    let kind = kind_of(parse, custom)?;
    if allowed.contains(&kind) {
        return Ok(());
    }
    Err(ParseError::semantic(
        format!("{} {} cannot be used as {}", kind, quote(&custom.qualified_name()), role),
        &custom.token,
    ))
}

const VALUE_KINDS: &[DeclarationKind] = &[DeclarationKind::Message, DeclarationKind::Enum, DeclarationKind::Typedef];
const KEY_KINDS: &[DeclarationKind] = &[DeclarationKind::Enum, DeclarationKind::Typedef];

fn check_field_type(parse: &Parse, data_type: &DataType) -> Result<(), ParseError> {
    match data_type {
        DataType::Scalar(_) => Ok(()),
        DataType::List(inner) => check_field_type(parse, inner),
        DataType::Map(key, value) => {
            if let ComparableType::Custom(custom) = key {
                expect_kind(parse, custom, KEY_KINDS, "a map key")?;
            }
            check_field_type(parse, value)
        }
        DataType::Custom(custom) => expect_kind(parse, custom, VALUE_KINDS, "a field type"),
    }
}

fn check_method_message(parse: &Parse, data_type: &DataType, role: &str) -> Result<(), ParseError> {
    match data_type.as_custom() {
        Some(custom) => expect_kind(parse, custom, &[DeclarationKind::Message], role),
        None => Ok(()),
    }
}

/// Every reference must name a declaration of a kind that fits where it is used.
fn check_type_kinds(parse: &Parse, file: &File) -> Result<(), ParseError> {
    for c in file.consts.values() {
        if let ComparableType::Custom(custom) = &c.data_type {
            expect_kind(parse, custom, KEY_KINDS, "a const type")?;
        }
    }
    for message in file.messages.values() {
        for field in message.fields.values() {
            check_field_type(parse, &field.data_type)?;
        }
    }
    for service in file.services.values() {
        for method in service.methods.values() {
            check_method_message(parse, &method.argument, "a method argument")?;
            match &method.returns {
                MethodReturn::Message(data_type) => check_method_message(parse, data_type, "a method return")?,
                MethodReturn::Stream(stream) => {
                    expect_kind(parse, stream, &[DeclarationKind::Stream], "a returned stream")?
                }
            }
        }
    }
    for stream in file.streams.values() {
        for method in stream.methods.values() {
            check_method_message(parse, &method.argument, "a method argument")?;
            check_method_message(parse, &method.returns, "a method return")?;
        }
    }
    Ok(())
}

fn qualified(package: &str, name: &str) -> String {
    format!("{}.{}", package, name)
}

/// Rejects any message that embeds itself, directly or through other
/// messages, lists or maps. Enums and typedefs end a path.
fn check_message_cycles(parse: &Parse) -> Result<(), ParseError> {
    let mut acyclic = BTreeSet::new();
    for file in parse.files.values() {
        for message in file.messages.values() {
            visit_message(parse, file, message, BTreeSet::new(), &mut acyclic)?;
        }
    }
    Ok(())
}

fn visit_message(
    parse:    &Parse,
    file:     &File,
    message:  &MessageDefinition,
    mut ancestry: BTreeSet<String>,
    acyclic:  &mut BTreeSet<String>,
) -> Result<(), ParseError> {
    let key = qualified(file.package_name(), &message.name);
    if acyclic.contains(&key) {
        return Ok(());
    }
    ancestry.insert(key.clone());

    for field in message.fields_by_index() {
        for custom in field.data_type.custom_types() {
            let Some(next_file) = parse.defining_file(&custom.package, &custom.name) else {
                continue;
            };
            let Some(next) = next_file.messages.get(&custom.name) else {
                continue;
            };

            if ancestry.contains(&custom.qualified_name()) {
                return Err(ParseError::graph(
                    format!("circular reference detected in definition {}", quote(&message.name)),
                    Some(&field.token),
                )
                .in_file(&file.path, &file.content));
            }
            visit_message(parse, next_file, next, ancestry.clone(), acyclic)?;
        }
    }

    acyclic.insert(key);
    Ok(())
}

fn check_file_cycles(parse: &Parse) -> Result<(), ParseError> {
    let mut acyclic = BTreeSet::new();
    for file in parse.files.values() {
        visit_file(parse, file, BTreeSet::new(), &mut acyclic)?;
    }
    Ok(())
}

fn visit_file<'a>(
    parse:    &'a Parse,
    file:     &'a File,
    mut ancestry: BTreeSet<&'a str>,
    acyclic:  &mut BTreeSet<&'a str>,
) -> Result<(), ParseError> {
    if acyclic.contains(file.path.as_str()) {
        return Ok(());
    }
    ancestry.insert(&file.path);

    for dependency in file.file_dependencies() {
        if ancestry.contains(dependency.file) {
            return Err(ParseError::graph(
                format!("circular dependency detected between files {} and {}", file.path, dependency.file),
                Some(dependency.token),
            )
            .in_file(&file.path, &file.content));
        }
        if let Some(next) = parse.files.get(dependency.file) {
            visit_file(parse, next, ancestry.clone(), acyclic)?;
        }
    }

    acyclic.insert(&file.path);
    Ok(())
}

fn check_package_cycles(parse: &Parse) -> Result<(), ParseError> {
    let mut acyclic = BTreeSet::new();
    for package in parse.packages.keys() {
        visit_package(parse, package, BTreeSet::new(), &mut acyclic)?;
    }
    Ok(())
}

fn visit_package<'a>(
    parse:    &'a Parse,
    name:     &'a str,
    mut ancestry: BTreeSet<&'a str>,
    acyclic:  &mut BTreeSet<&'a str>,
) -> Result<(), ParseError> {
    let Some(package) = parse.packages.get(name) else {
        return Ok(());
    };
    if acyclic.contains(name) {
        return Ok(());
    }
    ancestry.insert(name);

    for dependency in package.dependencies.values() {
        if ancestry.contains(dependency.package.as_str()) {
            let mut err = ParseError::graph(
                format!("circular dependency detected between packages {} and {}", name, dependency.package),
                Some(&dependency.token),
            );
            if let Some(file) = parse.files.get(&dependency.file) {
                err = err.in_file(&file.path, &file.content);
            }
            return Err(err);
        }
        visit_package(parse, &dependency.package, ancestry.clone(), acyclic)?;
    }

    acyclic.insert(name);
    Ok(())
}

/// The value named by an enum const: `Blue`, `Color.Blue` or `pkg.Color.Blue`.
fn enum_value_name<'a>(value: &'a str, enum_type: &CustomType) -> Option<&'a str> {
    let name = value
        .strip_prefix(enum_type.qualified_name().as_str())
        .or_else(|| value.strip_prefix(enum_type.name.as_str()))
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(value);
    (!name.contains('.')).then_some(name)
}

/// Validates literals of consts typed by a typedef or enum.
///
/// Typedef-typed consts are checked against the alias' underlying scalar and
/// have it recorded on the declaration. Enum-typed consts must name one of
/// the enum's values.
fn resolve_consts(parse: &mut Parse) -> Result<(), ParseError> {
    let mut bindings = Vec::new();

    for file in parse.files.values() {
        for c in file.consts.values() {
            let ComparableType::Custom(custom) = &c.data_type else {
                continue;
            };
            let fail = |e: ParseError| e.in_file(&file.path, &file.content);

            if let Some(typedef) = parse.typedef(&custom.package, &custom.name) {
                validate_literal(typedef.underlying, &c.value)
                    .map_err(|message| fail(ParseError::semantic(message, &c.value_token)))?;
                bindings.push((file.path.clone(), c.name.clone(), typedef.underlying));
            } else if let Some(definition) = parse.enum_definition(&custom.package, &custom.name) {
                let value = enum_value_name(&c.value, custom);
                if !value.is_some_and(|v| definition.values.contains_key(v)) {
                    return Err(fail(ParseError::semantic(
                        format!(
                            "const {} value {} is not a value of enum {}",
                            quote(&c.name),
                            quote(&c.value),
                            quote(&custom.qualified_name())
                        ),
                        &c.value_token,
                    )));
                }
            }
        }
    }

    for (path, name, underlying) in bindings {
        if let Some(declaration) = parse.files.get_mut(&path).and_then(|f| f.consts.get_mut(&name)) {
            declaration.underlying = Some(underlying);
        }
    }
    Ok(())
}

struct WireIdRequest {
    file:    String,
    package: String,
    owner:   String,
    token:   Token,
    methods: Vec<(String, Token)>,
    stream:  bool,
}

fn assign_request(package: &mut Package, request: &WireIdRequest) -> Result<(), ParseError> {
    if request.stream {
        package.assign_stream_id(&request.owner, &request.token)?;
        for (method, token) in &request.methods {
            package.assign_stream_method_id(&request.owner, method, token)?;
        }
    } else {
        package.assign_service_id(&request.owner, &request.token)?;
        for (method, token) in &request.methods {
            package.assign_method_id(&request.owner, method, token)?;
        }
    }
    Ok(())
}

/// Hashes every service, stream and method name into its package's tables.
fn assign_wire_ids(parse: &mut Parse) -> Result<(), ParseError> {
    let mut requests = Vec::new();

    for file in parse.files.values() {
        for service in file.services.values() {
            requests.push(WireIdRequest {
                file:    file.path.clone(),
                package: file.package.name.clone(),
                owner:   service.name.clone(),
                token:   service.token.clone(),
                methods: service.methods.values().map(|m| (m.name.clone(), m.token.clone())).collect(),
                stream:  false,
            });
        }
        for stream in file.streams.values() {
            requests.push(WireIdRequest {
                file:    file.path.clone(),
                package: file.package.name.clone(),
                owner:   stream.name.clone(),
                token:   stream.token.clone(),
                methods: stream.methods.values().map(|m| (m.name.clone(), m.token.clone())).collect(),
                stream:  true,
            });
        }
    }

    for request in requests {
        let Some(package) = parse.packages.get_mut(&request.package) else {
            continue;
        };
        if let Err(e) = assign_request(package, &request) {
            return Err(match parse.files.get(&request.file) {
                Some(file) => e.in_file(&file.path, &file.content),
                None => e,
            });
        }
        trace!(package = %request.package, owner = %request.owner, "assigned wire ids");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::error::ErrorKind;
    use crate::file::parse_file_content;
    use crate::processor::assemble_packages;
    use crate::types::ComparableScalar;

    fn resolve_sources(sources: &[(&str, &str)]) -> Result<Parse, ParseError> {
        let mut files = BTreeMap::new();
        for (path, content) in sources {
            files.insert(path.to_string(), parse_file_content(path, content)?);
        }
        let mut parse = assemble_packages(files)?;
        resolve(&mut parse)?;
        Ok(parse)
    }

    #[test]
    fn test_binds_dependencies_to_files() {
        let parse = resolve_sources(&[
            ("a.scg", "package a;\nmessage A { b.B b = 0; }"),
            ("b.scg", "package b;\nmessage B { int32 x = 0; }"),
        ])
        .unwrap();
        let dependency = &parse.files["a.scg"].dependencies["b.B"];
        assert_eq!(dependency.file.as_deref(), Some("b.scg"));

        let edges: Vec<&str> = parse.files["a.scg"].file_dependencies().iter().map(|d| d.file).collect();
        assert_eq!(edges, vec!["b.scg"]);
    }

    #[test]
    fn test_unknown_package_and_type() {
        let err = resolve_sources(&[("a.scg", "package a;\nmessage A { nope.B b = 0; }")]).unwrap_err();
        assert_eq!(err.message, "package \"nope\" not found");
        assert_eq!(err.filename.as_deref(), Some("a.scg"));

        let err = resolve_sources(&[("a.scg", "package a;\nmessage A { Missing m = 0; }")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Semantic);
        assert_eq!(err.message, "type \"a.Missing\" not found");
        let token = err.token.unwrap();
        assert_eq!((token.line_start, token.col_start, token.col_end), (1, 12, 19));
    }

    #[test]
    fn test_kind_mismatches() {
        let err = resolve_sources(&[(
            "a.scg",
            "package a;\nmessage A { int32 x = 0; }\nmessage B { map<A, int32> m = 0; }",
        )])
        .unwrap_err();
        assert_eq!(err.message, "message \"a.A\" cannot be used as a map key");

        let err = resolve_sources(&[(
            "a.scg",
            "package a;\nenum E { X = 0; }\nservice S { rpc Get (E) returns (E); }",
        )])
        .unwrap_err();
        assert_eq!(err.message, "enum \"a.E\" cannot be used as a method argument");

        let err = resolve_sources(&[(
            "a.scg",
            "package a;\nmessage M { int32 x = 0; }\nservice S { rpc Get (M) returns (stream M); }",
        )])
        .unwrap_err();
        assert_eq!(err.message, "message \"a.M\" cannot be used as a returned stream");
    }

    #[test]
    fn test_direct_self_reference() {
        let err = resolve_sources(&[("a.scg", "package a;\nmessage A { A a = 0; }")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Graph);
        assert_eq!(err.message, "circular reference detected in definition \"A\"");
    }

    #[test]
    fn test_cycle_through_list_and_map() {
        let err = resolve_sources(&[(
            "a.scg",
            "package a;\nmessage A { list<B> b = 0; }\nmessage B { map<string, A> a = 0; }",
        )])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Graph);
        assert!(err.message.starts_with("circular reference detected in definition"));
    }

    #[test]
    fn test_diamond_is_accepted() {
        let parse = resolve_sources(&[(
            "a.scg",
            "package a;\nmessage A { B b = 0; C c = 1; }\nmessage B { D d = 0; }\nmessage C { D d = 0; }\nmessage D { int32 x = 0; }",
        )]);
        assert!(parse.is_ok());
    }

    #[test]
    fn test_file_cycle() {
        let err = resolve_sources(&[
            ("a.scg", "package p;\nmessage A { B b = 0; }"),
            ("b.scg", "package p;\nenum E { X = 0; }\nmessage B { int32 x = 0; }\nmessage C { A a = 0; }"),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Graph);
        assert_eq!(err.message, "circular dependency detected between files b.scg and a.scg");
    }

    #[test]
    fn test_package_cycle() {
        let err = resolve_sources(&[
            ("a.scg", "package a;\nmessage A { b.B b = 0; }"),
            ("b1.scg", "package b;\nmessage B { int32 x = 0; }"),
            ("b2.scg", "package b;\nmessage C { a.A a = 0; }"),
        ])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Graph);
        assert_eq!(err.message, "circular dependency detected between packages b and a");
        assert_eq!(err.filename.as_deref(), Some("b2.scg"));
    }

    #[test]
    fn test_const_through_typedef() {
        let parse = resolve_sources(&[(
            "a.scg",
            "package a;\ntypedef Small = uint8;\nconst Small LIMIT = 0xFF;",
        )])
        .unwrap();
        assert_eq!(parse.files["a.scg"].consts["LIMIT"].underlying, Some(ComparableScalar::UInt8));

        let err = resolve_sources(&[("a.scg", "package a;\ntypedef Small = uint8;\nconst Small LIMIT = 256;")]).unwrap_err();
        assert_eq!(err.message, "value 256 out of range for uint8");
        assert_eq!(err.token.unwrap().line_start, 2);
    }

    #[test]
    fn test_const_through_enum() {
        let source = "package a;\nenum Color { Red = 0; Blue = 1; }\nconst Color DEFAULT = Blue;";
        assert!(resolve_sources(&[("a.scg", source)]).is_ok());

        let err = resolve_sources(&[("a.scg", "package a;\nenum Color { Red = 0; }\nconst Color DEFAULT = Green;")]).unwrap_err();
        assert_eq!(err.message, "const \"DEFAULT\" value \"Green\" is not a value of enum \"a.Color\"");
    }

    #[test]
    fn test_const_enum_value_prefixes() {
        let accepted = ["Blue", "Color.Blue", "a.Color.Blue"];
        for value in accepted {
            let source = format!("package a;\nenum Color {{ Red = 0; Blue = 1; }}\nconst Color DEFAULT = {};", value);
            assert!(resolve_sources(&[("a.scg", source.as_str())]).is_ok(), "{} rejected", value);
        }

        let rejected = ["Other.Blue", "b.Color.Blue", "Color.Blue.Red", "Colorx.Blue"];
        for value in rejected {
            let source = format!("package a;\nenum Color {{ Red = 0; Blue = 1; }}\nconst Color DEFAULT = {};", value);
            let err = resolve_sources(&[("a.scg", source.as_str())]).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Semantic, "{} accepted", value);
        }
    }

    #[test]
    fn test_wire_ids_assigned() {
        let parse = resolve_sources(&[(
            "a.scg",
            "package a;\nmessage M { int32 x = 0; }\nstream Chat { client Send (M) returns (M); }\nservice Api { rpc Open (M) returns (stream Chat); rpc Get (M) returns (M); }",
        )])
        .unwrap();
        let package = &parse.packages["a"];
        assert!(package.hash_to_service_id("Api").is_some());
        assert!(package.hash_to_method_id("Api", "Open").is_some());
        assert!(package.hash_to_method_id("Api", "Get").is_some());
        assert!(package.hash_to_stream_id("Chat").is_some());
        assert!(package.hash_to_stream_method_id("Chat", "Send").is_some());
        assert_eq!(package.wire_ids.services.len(), 1);
    }
}
