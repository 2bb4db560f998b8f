use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::{
    error::ParseError,
    literal::validate_literal,
    pattern::{find_one_match, Match},
    statements::tokenize_statements,
    tokenizer::{Token, TokenKind},
    type_parser::{parse_comparable_type, parse_data_type},
    types::{
        ComparableType, ConstDeclaration, CustomType, DataType, EnumDefinition, EnumValueDefinition,
        FieldDefinition, MessageDefinition, MethodReturn, PackageDeclaration,
        ServiceDefinition, ServiceMethodDefinition, StreamDefinition, StreamDirection,
        StreamMethodDefinition, TypedefDeclaration,
    },
    utils::quote,
};

lazy_static! {
    static ref IDENTIFIER:     Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
    static ref INDEX:          Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref PACKAGE:        Regex = Regex::new(r"(?s)^package\s+([A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z][A-Za-z0-9_]*)*)\s*;$").unwrap();
    static ref TYPEDEF:        Regex = Regex::new(r"(?s)^typedef\s+(\S+?)\s*=\s*(\S+?)\s*;$").unwrap();
    static ref CONST:          Regex = Regex::new(r"(?s)^const\s+(\S+)\s+(\S+?)\s*=\s*(.*?)\s*;$").unwrap();
    static ref MESSAGE:        Regex = Regex::new(r"(?s)^message\s+(\S+?)\s*\{(.*)\}$").unwrap();
    static ref ENUM:           Regex = Regex::new(r"(?s)^enum\s+(\S+?)\s*\{(.*)\}$").unwrap();
    static ref SERVICE:        Regex = Regex::new(r"(?s)^service\s+(\S+?)\s*\{(.*)\}$").unwrap();
    static ref STREAM:         Regex = Regex::new(r"(?s)^stream\s+(\S+?)\s*\{(.*)\}$").unwrap();
    static ref MESSAGE_FIELD:  Regex = Regex::new(r"(?s)^(.+?)\s+([^\s=]+)\s*=\s*([^\s;]+)\s*;$").unwrap();
    static ref ENUM_VALUE:     Regex = Regex::new(r#"(?s)^([^\s="]+)\s*(?:"((?:[^"\\]|\\.)*)"\s*)?=\s*([^\s;]+)\s*;$"#).unwrap();
    static ref SERVICE_METHOD: Regex = Regex::new(
        r"(?s)^rpc\s+(\S+?)\s*\(\s*([^()\s]+)\s*\)\s*returns\s*\(\s*(?:(stream)\s+)?([^()\s]+)\s*\)\s*;$"
    ).unwrap();
    static ref STREAM_METHOD:  Regex = Regex::new(
        r"(?s)^(client|server)\s+(\S+?)\s*\(\s*([^()\s]+)\s*\)\s*returns\s*\(\s*([^()\s]+)\s*\)\s*;$"
    ).unwrap();
}

/// Matches `re` against `token`, prefixing any failure with `what`.
fn extract(re: &Regex, token: &Token, what: &str) -> Result<Match, ParseError> {
    find_one_match(re, token).map_err(|e| {
        ParseError::grammar(format!("invalid {}: {}", what, e.message), token)
    })
}

/// Capture group `index`, which the pattern guarantees is present.
fn group<'a>(m: &'a Match, index: usize, token: &Token) -> Result<&'a Token, ParseError> {
    m.group(index)
        .ok_or_else(|| ParseError::grammar(format!("internal parsing error: missing group {}", index), token))
}

fn identifier(token: &Token, what: &str) -> Result<String, ParseError> {
    if IDENTIFIER.is_match(&token.content) {
        Ok(token.content.clone())
    } else {
        Err(ParseError::grammar(format!("invalid {} name {}", what, quote(&token.content)), token))
    }
}

fn index(token: &Token) -> Result<u32, ParseError> {
    if !INDEX.is_match(&token.content) {
        return Err(ParseError::grammar(format!("invalid index {}", quote(&token.content)), token));
    }
    token
        .content
        .parse::<u32>()
        .map_err(|e| ParseError::semantic(format!("invalid index {}: {}", quote(&token.content), e), token))
}

fn insert_unique<T>(
    map:   &mut BTreeMap<String, T>,
    name:  String,
    value: T,
    what:  &str,
    token: &Token,
) -> Result<(), ParseError> {
    if map.contains_key(&name) {
        return Err(ParseError::semantic(
            format!("{} {} defined multiple times", what, quote(&name)),
            token,
        ));
    }
    map.insert(name, value);
    Ok(())
}

/// Requires the indices of a message or enum to be exactly `0..n`.
fn check_dense_indices<'a>(
    entries:   impl Iterator<Item = (u32, &'a Token)>,
    count:     usize,
    container: &str,
    what:      &str,
    token:     &Token,
) -> Result<(), ParseError> {
    let mut seen = BTreeSet::new();
    for (index, entry) in entries {
        if !seen.insert(index) {
            return Err(ParseError::semantic(
                format!("duplicate index {} in definition {}", index, quote(container)),
                entry,
            ));
        }
    }
    for expected in 0..count as u32 {
        if !seen.contains(&expected) {
            return Err(ParseError::semantic(
                format!("missing index {} in {} definition {}", expected, what, quote(container)),
                token,
            ));
        }
    }
    Ok(())
}

fn tokens_of(tokens: &[Token], kind: TokenKind) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(move |t| t.kind == kind)
}

/// Extracts the file's single `package` declaration.
pub fn parse_package_declaration(tokens: &[Token]) -> Result<PackageDeclaration, ParseError> {
    let mut declarations = tokens_of(tokens, TokenKind::Package);
    let Some(token) = declarations.next() else {
        return Err(ParseError::semantic("missing package declaration", &Token::at(0, 0)));
    };
    if let Some(extra) = declarations.next() {
        return Err(ParseError::semantic("multiple package declarations", extra));
    }

    let m = extract(&PACKAGE, token, "package declaration")?;
    Ok(PackageDeclaration {
        name:  group(&m, 1, token)?.content.clone(),
        token: token.clone(),
    })
}

pub fn parse_typedef_declarations(tokens: &[Token]) -> Result<BTreeMap<String, TypedefDeclaration>, ParseError> {
    let mut typedefs = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Typedef) {
        let m = extract(&TYPEDEF, token, "typedef declaration")?;
        let name = identifier(group(&m, 1, token)?, "typedef")?;
        let target = group(&m, 2, token)?;

        let underlying = match parse_comparable_type(target)? {
            ComparableType::Scalar(scalar) => scalar,
            ComparableType::Custom(_) => {
                return Err(ParseError::semantic(
                    format!("typedef {} must alias a comparable scalar type", quote(&name)),
                    target,
                ));
            }
        };

        trace!(typedef = %name, underlying = underlying.keyword(), "parsed typedef");
        let typedef = TypedefDeclaration { name: name.clone(), underlying, token: token.clone() };
        insert_unique(&mut typedefs, name, typedef, "typedef", token)?;
    }

    Ok(typedefs)
}

/// Extracts consts. Literals of scalar-typed consts are validated here; consts
/// typed by a custom name are validated by the resolver once it is bound.
pub fn parse_const_declarations(tokens: &[Token]) -> Result<BTreeMap<String, ConstDeclaration>, ParseError> {
    let mut consts = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Const) {
        let m = extract(&CONST, token, "const declaration")?;
        let data_type = parse_comparable_type(group(&m, 1, token)?)?;
        let name = identifier(group(&m, 2, token)?, "const")?;
        let value_token = group(&m, 3, token)?;

        if value_token.content.is_empty() {
            return Err(ParseError::grammar(format!("const {} has no value", quote(&name)), token));
        }
        if let ComparableType::Scalar(scalar) = &data_type {
            validate_literal(*scalar, &value_token.content)
                .map_err(|message| ParseError::semantic(message, value_token))?;
        }

        let declaration = ConstDeclaration {
            name:        name.clone(),
            value:       value_token.content.clone(),
            data_type,
            underlying:  None,
            token:       token.clone(),
            value_token: value_token.clone(),
        };
        insert_unique(&mut consts, name, declaration, "const", token)?;
    }

    Ok(consts)
}

pub fn parse_enum_definitions(tokens: &[Token]) -> Result<BTreeMap<String, EnumDefinition>, ParseError> {
    let mut enums = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Enum) {
        let m = extract(&ENUM, token, "enum definition")?;
        let name = identifier(group(&m, 1, token)?, "enum")?;
        let body = group(&m, 2, token)?;

        let mut values = BTreeMap::new();
        for statement in tokenize_statements(body, TokenKind::EnumValue, "enum")? {
            let vm = extract(&ENUM_VALUE, &statement, "enum value")?;
            let value_name = identifier(group(&vm, 1, &statement)?, "enum value")?;
            let value = EnumValueDefinition {
                name:  value_name.clone(),
                index: index(group(&vm, 3, &statement)?)?,
                value: vm.group(2).map(|t| t.content.clone()),
                token: statement.clone(),
            };
            insert_unique(&mut values, value_name, value, "enum value", &statement)?;
        }

        if values.is_empty() {
            return Err(ParseError::semantic(format!("enum {} has no values", quote(&name)), token));
        }
        check_dense_indices(
            values.values().map(|v| (v.index, &v.token)),
            values.len(),
            &name,
            "enum",
            token,
        )?;

        trace!(name = %name, values = values.len(), "parsed enum");
        let definition = EnumDefinition { name: name.clone(), values, token: token.clone() };
        insert_unique(&mut enums, name, definition, "enum", token)?;
    }

    Ok(enums)
}

pub fn parse_message_definitions(tokens: &[Token]) -> Result<BTreeMap<String, MessageDefinition>, ParseError> {
    let mut messages = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Message) {
        let m = extract(&MESSAGE, token, "message definition")?;
        let name = identifier(group(&m, 1, token)?, "message")?;
        let body = group(&m, 2, token)?;

        let mut fields = BTreeMap::new();
        for statement in tokenize_statements(body, TokenKind::MessageField, "field")? {
            let fm = extract(&MESSAGE_FIELD, &statement, "message field")?;
            let field_name = identifier(group(&fm, 2, &statement)?, "field")?;
            let field = FieldDefinition {
                name:      field_name.clone(),
                index:     index(group(&fm, 3, &statement)?)?,
                data_type: parse_data_type(group(&fm, 1, &statement)?)?,
                token:     statement.clone(),
            };
            insert_unique(&mut fields, field_name, field, "field", &statement)?;
        }

        check_dense_indices(
            fields.values().map(|f| (f.index, &f.token)),
            fields.len(),
            &name,
            "message",
            token,
        )?;

        trace!(name = %name, fields = fields.len(), "parsed message");
        let definition = MessageDefinition { name: name.clone(), fields, token: token.clone() };
        insert_unique(&mut messages, name, definition, "message", token)?;
    }

    Ok(messages)
}

/// Method arguments and returns must name a message (or a stream, for
/// `returns (stream Name)`).
fn message_reference(token: &Token, what: &str) -> Result<CustomType, ParseError> {
    match parse_data_type(token)? {
        DataType::Custom(custom) => Ok(custom),
        _ => Err(ParseError::semantic(
            format!("invalid method {} type {}, must be a message", what, quote(&token.content)),
            token,
        )),
    }
}

pub fn parse_service_definitions(tokens: &[Token]) -> Result<BTreeMap<String, ServiceDefinition>, ParseError> {
    let mut services = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Service) {
        let m = extract(&SERVICE, token, "service definition")?;
        let name = identifier(group(&m, 1, token)?, "service")?;
        let body = group(&m, 2, token)?;

        let mut methods = BTreeMap::new();
        for statement in tokenize_statements(body, TokenKind::ServiceMethod, "method")? {
            let mm = extract(&SERVICE_METHOD, &statement, "service method")?;
            let method_name = identifier(group(&mm, 1, &statement)?, "method")?;
            let argument = DataType::Custom(message_reference(group(&mm, 2, &statement)?, "argument")?);

            let returned = message_reference(group(&mm, 4, &statement)?, "return")?;
            let returns = if mm.group(3).is_some() {
                MethodReturn::Stream(returned)
            } else {
                MethodReturn::Message(DataType::Custom(returned))
            };

            let method = ServiceMethodDefinition {
                name: method_name.clone(),
                argument,
                returns,
                token: statement.clone(),
            };
            insert_unique(&mut methods, method_name, method, "method", &statement)?;
        }

        trace!(name = %name, methods = methods.len(), "parsed service");
        let definition = ServiceDefinition { name: name.clone(), methods, token: token.clone() };
        insert_unique(&mut services, name, definition, "service", token)?;
    }

    Ok(services)
}

pub fn parse_stream_definitions(tokens: &[Token]) -> Result<BTreeMap<String, StreamDefinition>, ParseError> {
    let mut streams = BTreeMap::new();

    for token in tokens_of(tokens, TokenKind::Stream) {
        let m = extract(&STREAM, token, "stream definition")?;
        let name = identifier(group(&m, 1, token)?, "stream")?;
        let body = group(&m, 2, token)?;

        let mut methods = BTreeMap::new();
        for statement in tokenize_statements(body, TokenKind::StreamMethod, "method")? {
            let mm = extract(&STREAM_METHOD, &statement, "stream method")?;
            let direction = match mm.text(1) {
                "client" => StreamDirection::Client,
                _        => StreamDirection::Server,
            };
            let method_name = identifier(group(&mm, 2, &statement)?, "method")?;
            let method = StreamMethodDefinition {
                name:      method_name.clone(),
                direction,
                argument:  DataType::Custom(message_reference(group(&mm, 3, &statement)?, "argument")?),
                returns:   DataType::Custom(message_reference(group(&mm, 4, &statement)?, "return")?),
                token:     statement.clone(),
            };
            insert_unique(&mut methods, method_name, method, "method", &statement)?;
        }

        trace!(name = %name, methods = methods.len(), "parsed stream");
        let definition = StreamDefinition { name: name.clone(), methods, token: token.clone() };
        insert_unique(&mut streams, name, definition, "stream", token)?;
    }

    Ok(streams)
}
