//! CLI integration tests for the erp-rest-bridge binary.
//!
//! A mockito server plays the remote JSON-RPC endpoint.

use assert_cmd::Command;
use mockito::{Matcher, Mock, ServerGuard};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("erp-rest-bridge"));
    for var in [
        "ERP_BRIDGE_SERVER",
        "ERP_BRIDGE_DATABASE",
        "ERP_BRIDGE_USER",
        "ERP_BRIDGE_PASSWORD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Command pre-configured to talk to `server` through the environment.
fn connected(server: &ServerGuard) -> Command {
    let mut cmd = cmd();
    cmd.env("ERP_BRIDGE_SERVER", server.url())
        .env("ERP_BRIDGE_DATABASE", "prod")
        .env("ERP_BRIDGE_USER", "admin")
        .env("ERP_BRIDGE_PASSWORD", "secret");
    cmd
}

// Helper to create a temp document file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn rpc_result(result: &str) -> String {
    format!(r#"{{"jsonrpc": "2.0", "id": 1, "result": {result}}}"#)
}

fn login(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/jsonrpc")
        .match_body(Matcher::PartialJsonString(
            r#"{"params": {"service": "common", "method": "login"}}"#.to_string(),
        ))
        .with_header("content-type", "application/json")
        .with_body(rpc_result("2"))
        .create()
}

/// Mock an `execute_kw` call by its method name.
fn object_call(server: &mut ServerGuard, method: &str, result: &str) -> Mock {
    server
        .mock("POST", "/jsonrpc")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJsonString(r#"{"params": {"service": "object"}}"#.to_string()),
            Matcher::Regex(format!(r#""{method}""#)),
        ]))
        .with_header("content-type", "application/json")
        .with_body(rpc_result(result))
        .create()
}

const PARTNER_FIELDS: &str = r#"{"name": {"type": "char", "required": true}, "email": {"type": "char"}}"#;

mod usage {
    use super::*;

    #[test]
    fn help_lists_commands() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("list"))
            .stdout(predicate::str::contains("delete"))
            .stdout(predicate::str::contains("call"));
    }

    #[test]
    fn missing_server_is_usage_error() {
        cmd()
            .args(["get", "res.partner", "7"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("ERP_BRIDGE_SERVER"));
    }

    #[test]
    fn non_numeric_id_rejected() {
        cmd()
            .args(["--server", "http://127.0.0.1:1", "get", "res.partner", "seven"])
            .assert()
            .failure();
    }
}

mod connecting {
    use super::*;

    #[test]
    fn refused_login_is_io_error() {
        let mut server = mockito::Server::new();
        let _login = server
            .mock("POST", "/jsonrpc")
            .with_header("content-type", "application/json")
            .with_body(rpc_result("false"))
            .create();

        connected(&server)
            .args(["get", "res.partner", "7"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("authentication failed"));
    }

    #[test]
    fn flags_override_environment() {
        let mut server = mockito::Server::new();
        let login = server
            .mock("POST", "/jsonrpc")
            .match_body(Matcher::PartialJsonString(
                r#"{"params": {"args": ["other", "demo", "demo"]}}"#.to_string(),
            ))
            .with_header("content-type", "application/json")
            .with_body(rpc_result("5"))
            .create();
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _read = object_call(&mut server, "read", r#"[{"id": 7, "name": "Acme"}]"#);

        connected(&server)
            .args([
                "--database", "other", "--user", "demo", "--password", "demo", "get",
                "res.partner", "7", "--schema", "name",
            ])
            .assert()
            .success();
        login.assert();
    }
}

mod reading {
    use super::*;

    #[test]
    fn get_prints_record() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _read = object_call(
            &mut server,
            "read",
            r#"[{"id": 7, "name": "Acme", "email": false}]"#,
        );

        connected(&server)
            .args(["get", "ResPartner", "7"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""name":"Acme""#))
            .stdout(predicate::str::contains(r#""email":null"#));
    }

    #[test]
    fn get_missing_is_not_found() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _read = object_call(&mut server, "read", "[]");

        connected(&server)
            .args(["get", "res.partner", "404", "--schema", "name"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":"ERROR""#));
    }

    #[test]
    fn list_prints_page() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _count = object_call(&mut server, "search_count", "1");
        let _search = object_call(&mut server, "search", "[7]");
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _read = object_call(&mut server, "read", r#"[{"id": 7, "name": "Acme"}]"#);

        connected(&server)
            .args(["list", "res.partner", "--schema", "name", "--pretty"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"n_items\": 1"))
            .stdout(predicate::str::contains("\"limit\": 80"));
    }

    #[test]
    fn malformed_filter_is_usage_error() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);

        connected(&server)
            .args(["list", "res.partner", "--filter", "[('name',"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains(r#""filter""#));
    }
}

mod writing {
    use super::*;

    #[test]
    fn create_prints_id() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _defaults = object_call(&mut server, "default_get", "{}");
        let create = object_call(&mut server, "create", "42");

        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(&dir, "partner.json", r#"{"name": "Acme"}"#);

        connected(&server)
            .args(["create", "res.partner", doc.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"status":"OK","id":42}"#));
        create.assert();
    }

    #[test]
    fn create_from_stdin() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _defaults = object_call(&mut server, "default_get", "{}");
        let _create = object_call(&mut server, "create", "43");

        connected(&server)
            .args(["create", "res.partner", "-"])
            .write_stdin(r#"{"name": "Acme"}"#)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""id":43"#));
    }

    #[test]
    fn validation_errors_never_reach_remote() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fields = object_call(&mut server, "fields_get", PARTNER_FIELDS);
        let _defaults = object_call(&mut server, "default_get", "{}");
        let create = server
            .mock("POST", "/jsonrpc")
            .match_body(Matcher::Regex(r#""create""#.to_string()))
            .expect(0)
            .create();

        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(&dir, "partner.json", r#"{"email": "a@b.c"}"#);

        connected(&server)
            .args(["create", "res.partner", doc.to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""name":["required field"]"#));
        create.assert();
    }

    #[test]
    fn missing_document_file() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);

        connected(&server)
            .args(["create", "res.partner", "/nonexistent/doc.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _search = object_call(&mut server, "search", "[]");

        connected(&server)
            .args(["delete", "res.partner", "9"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""status":"ERROR""#));
    }

    #[test]
    fn delete_existing() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _search = object_call(&mut server, "search", "[9]");
        let unlink = object_call(&mut server, "unlink", "true");

        connected(&server)
            .args(["delete", "res.partner", "9"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"status":"OK"}"#));
        unlink.assert();
    }
}

mod calling {
    use super::*;

    #[test]
    fn call_with_args() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _call = object_call(&mut server, "name_search", r#"[[7, "Acme"]]"#);

        let dir = TempDir::new().unwrap();
        let body = write_temp_file(&dir, "body.json", r#"{"args": ["Ac"]}"#);

        connected(&server)
            .args(["call", "res.partner", "name_search", body.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"res":[[7,"Acme"]]}"#));
    }

    #[test]
    fn remote_fault_is_io_error() {
        let mut server = mockito::Server::new();
        let _login = login(&mut server);
        let _fault = server
            .mock("POST", "/jsonrpc")
            .match_body(Matcher::Regex(r#""action_post""#.to_string()))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc": "2.0", "id": 2, "error": {"code": 200, "message": "Odoo Server Error",
                    "data": {"message": "record is locked"}}}"#,
            )
            .create();

        connected(&server)
            .args(["call", "account.move", "action_post", "--id", "3"])
            .assert()
            .code(3)
            .stdout(predicate::str::contains(r#""status":"ERROR""#))
            .stdout(predicate::str::contains("record is locked").not());
    }
}
