#![cfg(test)]

use std::collections::BTreeMap;

use scg_compiler::{
    compile, compile_source,
    tokenizer::{source_for_span, tokenize_file},
    types::{ComparableScalar, DataType, MethodReturn, StreamDirection},
    utils::hash_string_to_u64,
    CompileOptions, ErrorKind, ParseError, Parse,
};

fn compile_all(sources: &[(&str, &str)]) -> Result<Parse, ParseError> {
    let sources: BTreeMap<String, String> = sources
        .iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect();
    compile(&sources, &CompileOptions::default())
}

const SHARED: &str = r#"
package app.shared;

# Common building blocks.
typedef Email = string;

enum Status {
    Active "Currently active" = 0;
    Suspended = 1;
}

message Timestamped {
    timestamp created_at = 0;
    timestamp updated_at = 1;
}
"#;

const USERS: &str = r#"
package app.users;

const uint16 MAX_NAME = 0x40;
const app.shared.Email SUPPORT = "help@example.com";
const app.shared.Status DEFAULT_STATUS = Active;
const uuid ROOT = "67e55044-10b1-426f-9247-bb680e5fe0c8";

message User {
    uuid id = 0;
    app.shared.Email email = 1;
    app.shared.Status status = 2;
    app.shared.Timestamped times = 3;
    []Address addresses = 4;
    map[app.shared.Email]float64 scores = 5;
}

message GetUserRequest {
    uuid id = 0;
}

message Notice {
    string text = 0;
}

stream Notifications {
    server Notify (Notice) returns (Notice);
    client Ack (Notice) returns (Notice);
}

service UserService {
    rpc GetUser (GetUserRequest) returns (User);
    rpc Subscribe (GetUserRequest) returns (stream Notifications);
}
"#;

const ADDRESSES: &str = r#"
package app.users;

message Address {
    string street = 0;
    list<string> lines = 1;
}
"#;

#[test]
fn test_compile_multi_package_schema() {
    let parse = compile_all(&[
        ("shared/shared.scg", SHARED),
        ("users/users.scg", USERS),
        ("users/address.scg", ADDRESSES),
    ])
    .expect("compile failed");

    assert_eq!(parse.files.len(), 3);
    assert_eq!(parse.packages.len(), 2);

    let users = &parse.packages["app.users"];
    assert_eq!(users.files, vec!["users/address.scg", "users/users.scg"]);
    assert!(users.dependencies.contains_key("app.shared"));

    let user = parse.message("app.users", "User").expect("missing User");
    let fields: Vec<&str> = user.fields_by_index().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["id", "email", "status", "times", "addresses", "scores"]);

    let email = user.fields["email"].data_type.as_custom().expect("email is custom");
    assert!(email.imported);
    assert_eq!(email.package, "app.shared");

    let addresses = &user.fields["addresses"].data_type;
    assert_eq!(addresses.to_string(), "list<app.users.Address>");
    assert!(!addresses.element_type().as_custom().unwrap().imported);
}

#[test]
fn test_cross_file_dependency_resolves_to_defining_file() {
    let parse = compile_all(&[
        ("shared/shared.scg", SHARED),
        ("users/users.scg", USERS),
        ("users/address.scg", ADDRESSES),
    ])
    .expect("compile failed");

    let file = &parse.files["users/users.scg"];
    assert_eq!(file.dependencies["app.users.Address"].file.as_deref(), Some("users/address.scg"));
    assert_eq!(file.dependencies["app.shared.Email"].file.as_deref(), Some("shared/shared.scg"));

    let mut edges: Vec<&str> = file.file_dependencies().iter().map(|d| d.file).collect();
    edges.sort();
    assert_eq!(edges, vec!["shared/shared.scg", "users/address.scg"]);
}

#[test]
fn test_consts_and_enums() {
    let parse = compile_all(&[("shared.scg", SHARED), ("users.scg", USERS), ("address.scg", ADDRESSES)])
        .expect("compile failed");

    let support = parse.const_declaration("app.users", "SUPPORT").expect("missing const");
    assert_eq!(support.underlying, Some(ComparableScalar::String));
    assert_eq!(support.value, "\"help@example.com\"");

    let status = parse.const_declaration("app.users", "DEFAULT_STATUS").expect("missing const");
    assert_eq!(status.underlying, None);

    let max = parse.const_declaration("app.users", "MAX_NAME").expect("missing const");
    assert_eq!(max.value, "0x40");

    let status_enum = parse.enum_definition("app.shared", "Status").expect("missing enum");
    let values: Vec<&str> = status_enum.values_by_index().iter().map(|v| v.display_value()).collect();
    assert_eq!(values, vec!["Currently active", "Suspended"]);
}

#[test]
fn test_services_streams_and_wire_ids() {
    let parse = compile_all(&[("shared.scg", SHARED), ("users.scg", USERS), ("address.scg", ADDRESSES)])
        .expect("compile failed");

    let service = parse.service("app.users", "UserService").expect("missing service");
    match &service.methods["Subscribe"].returns {
        MethodReturn::Stream(stream) => assert_eq!(stream.qualified_name(), "app.users.Notifications"),
        other => panic!("expected a stream return, got {:?}", other),
    }
    assert!(matches!(service.methods["GetUser"].returns, MethodReturn::Message(DataType::Custom(_))));

    let stream = parse.stream("app.users", "Notifications").expect("missing stream");
    assert_eq!(stream.methods["Notify"].direction, StreamDirection::Server);
    assert_eq!(stream.methods["Ack"].direction, StreamDirection::Client);

    let package = &parse.packages["app.users"];
    assert_eq!(package.hash_to_service_id("UserService"), Some(hash_string_to_u64("UserService")));
    assert_eq!(package.hash_to_method_id("UserService", "GetUser"), Some(hash_string_to_u64("GetUser")));
    assert_eq!(package.hash_to_stream_id("Notifications"), Some(hash_string_to_u64("Notifications")));
    assert_eq!(package.hash_to_stream_method_id("Notifications", "Ack"), Some(hash_string_to_u64("Ack")));
    assert_eq!(package.hash_to_service_id("Unknown"), None);
}

#[test]
fn test_messages_sorted_by_dependencies() {
    let parse = compile_source(
        "order.scg",
        "package p;\nmessage Order { Line line = 0; Customer customer = 1; }\nmessage Line { Item item = 0; }\nmessage Item { string sku = 0; }\nmessage Customer { string name = 0; }",
    )
    .expect("compile failed");
    let order: Vec<&str> = parse.files["order.scg"]
        .messages_sorted_by_dependencies()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(order, vec!["Customer", "Item", "Line", "Order"]);
}

#[test]
fn test_cycle_is_rejected() {
    let err = compile_source("a.scg", "package a;\nmessage A { B b = 0; }\nmessage B { A a = 0; }")
        .expect_err("cycle accepted");
    assert_eq!(err.kind, ErrorKind::Graph);
    assert_eq!(err.message, "circular reference detected in definition \"B\"");
    assert_eq!(err.filename.as_deref(), Some("a.scg"));
}

#[test]
fn test_cycle_through_typedef_is_not_a_cycle() {
    let source = "package a;\ntypedef ID = uint64;\nenum Kind { X = 0; }\nmessage A { ID id = 0; Kind kind = 1; map<ID, Kind> m = 2; }";
    compile_source("a.scg", source).expect("typedefs and enums end a path");
}

#[test]
fn test_diamond_is_accepted() {
    let source = "package a;\nmessage A { B b = 0; C c = 1; }\nmessage B { D d = 0; }\nmessage C { D d = 0; }\nmessage D { string s = 0; }";
    compile_source("a.scg", source).expect("diamond rejected");
}

#[test]
fn test_missing_package() {
    let err = compile_source("a.scg", "package a;\nmessage A { ghost.G g = 0; }").expect_err("accepted");
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert_eq!(err.message, "package \"ghost\" not found");
}

#[test]
fn test_const_literals() {
    compile_source("a.scg", "package a;\nconst uint8 X = 0xFF;").expect("0xFF fits uint8");
    compile_source("a.scg", "package a;\nconst string S = \"a\\\"b\";").expect("escaped quote");

    let err = compile_source("a.scg", "package a;\nconst uint8 X = 256;").expect_err("256 fits uint8");
    assert_eq!(err.kind, ErrorKind::Semantic);

    for ty in ["float32", "float64"] {
        let source = format!("package a;\nconst {} X = 1e400;", ty);
        let err = compile_source("a.scg", &source).expect_err("overflowing float accepted");
        assert_eq!(err.message, format!("value 1e400 out of range for {}", ty));
    }

    let err = compile_source("a.scg", "package a;\nconst string S = \"unterminated").expect_err("accepted");
    assert_eq!(err.kind, ErrorKind::Lex);
}

#[test]
fn test_dense_indices() {
    let err = compile_source("a.scg", "package a;\nmessage A { int32 x = 0; int32 y = 2; }").expect_err("gap accepted");
    assert_eq!(err.message, "missing index 1 in message definition \"A\"");

    let err = compile_source("a.scg", "package a;\nenum E { X = 1; Y = 1; }").expect_err("duplicate accepted");
    assert_eq!(err.message, "duplicate index 1 in definition \"E\"");
}

#[test]
fn test_error_display_renders_snippet() {
    let err = compile_source("a.scg", "package a;\n\nmessage A {\n    Missing m = 0;\n}\n").expect_err("accepted");
    let rendered = err.to_string();
    assert!(rendered.starts_with("semantic error: type \"a.Missing\" not found, file: a.scg, line: 4, character: 5"));
    assert!(rendered.contains("4 |     Missing m = 0;"));
    assert!(rendered.contains("  |     ^~~~~~"));
}

#[test]
fn test_token_spans_round_trip() {
    let tokens = tokenize_file(USERS).expect("tokenize failed");
    assert_eq!(tokens.len(), 10);
    for token in &tokens {
        assert_eq!(source_for_span(USERS, token), token.content);
    }
}
