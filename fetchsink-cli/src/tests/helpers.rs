//! Scratch workspaces and canned responses for CLI tests.

use super::*;
use crate::config::PostgresSettings;
use camino::Utf8PathBuf;
use fetchsink_core::test_support::StubTransport;
use std::net::TcpListener;
use tempfile::TempDir;

pub(super) const RHYMES: &[u8] =
    br#"[{"word": "regretful", "score": 1393, "numSyllables": 3}, {"word": "nostalgic", "score": 7, "numSyllables": 3}]"#;

/// A temporary directory with a config whose artefacts all land inside it.
pub(super) struct Workspace {
    _dir: TempDir,
    pub(super) config: AppConfig,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let mut config = AppConfig {
            output_dir: root.join("files"),
            ..AppConfig::default()
        };
        config.sqlite.path = root.join("files/api.db");
        Self {
            _dir: dir,
            config,
        }
    }

    pub(super) fn artefact(&self, file_name: &str) -> Utf8PathBuf {
        self.config.output_dir.join(file_name)
    }

    pub(super) fn enable_unreachable_postgres(&mut self) {
        self.config.postgres = PostgresSettings {
            enabled: true,
            host: "127.0.0.1".to_owned(),
            port: free_port(),
            connect_timeout_secs: 2,
            ..PostgresSettings::default()
        };
    }
}

pub(super) fn rhymes() -> StubTransport {
    StubTransport::always(StubTransport::json_response(200, RHYMES))
}

/// A loopback port nothing listens on.
pub(super) fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}
