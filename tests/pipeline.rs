//! End-to-end run over on-disk fixtures: a JSON repository dump, tar.gz
//! payloads, an owner directory and an icon theme.

use flate2::write::GzEncoder;
use flate2::Compression;
use package_indexer::index::document::fields;
use package_indexer::{index_repository, IndexerConfig, PackageEntry, PipelineError};
use std::io::Write;
use std::path::Path;

fn write_payload(path: &Path, members: &[(&str, &str)]) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!(".{name}"), content.as_bytes())
            .unwrap();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();
    std::fs::write(path, encoder.finish().unwrap()).unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let packages = dir.path().join("packages");
        std::fs::create_dir_all(&packages).unwrap();

        write_payload(
            &packages.join("gedit.tar.gz"),
            &[
                (
                    "/usr/share/applications/org.gnome.gedit.desktop",
                    "[Desktop Entry]\nName=gedit\nIcon=accessories-text-editor\nCategories=GNOME;GTK;Utility;TextEditor;\n",
                ),
                ("/usr/bin/gedit", "elf"),
            ],
        );
        write_payload(
            &packages.join("gedit-plugins.tar.gz"),
            &[("/usr/lib64/gedit/plugins/wordcompletion.plugin", "plugin")],
        );
        write_payload(
            &packages.join("gedit.src.tar.gz"),
            &[
                ("/gedit.spec", "%global major 3\nName: gedit\nVersion: %{major}.38\nURL: https://wiki.gnome.org/Apps/Gedit\n"),
                ("/gedit-docs.spec", "Name: gedit-docs\nURL: https://example.org/wrong\n"),
            ],
        );
        write_payload(
            &packages.join("broken.src.tar.gz"),
            &[("/broken.spec", "Name: broken\nURL: https://example.org/%{name\n")],
        );
        write_payload(
            &packages.join("gnome-icon-theme.tar.gz"),
            &[
                ("/usr/share/icons/gnome/16x16/apps/accessories-text-editor.png", "small"),
                ("/usr/share/icons/gnome/48x48/apps/accessories-text-editor.png", "large"),
            ],
        );

        let repository = r#"[
            {"name": "gnome-icon-theme", "base_name": "gnome-icon-theme", "arch": "noarch",
             "summary": "GNOME icon theme", "archive": "gnome-icon-theme.tar.gz",
             "files": ["/usr/share/icons/gnome/16x16/apps/accessories-text-editor.png",
                       "/usr/share/icons/gnome/48x48/apps/accessories-text-editor.png"]},
            {"name": "gedit", "base_name": "gedit", "arch": "x86_64",
             "summary": "Text editor for the GNOME desktop", "description": "gedit is a small text editor.",
             "archive": "gedit.tar.gz",
             "files": ["/usr/share/applications/org.gnome.gedit.desktop", "/usr/bin/gedit"]},
            {"name": "gedit", "base_name": "gedit", "arch": "i686", "summary": "other arch",
             "archive": "gedit.i686.tar.gz", "files": []},
            {"name": "gedit-plugins", "base_name": "gedit", "arch": "x86_64",
             "summary": "Plugins for gedit", "archive": "gedit-plugins.tar.gz",
             "files": ["/usr/lib64/gedit/plugins/wordcompletion.plugin"]},
            {"name": "gedit", "base_name": "gedit", "arch": "src", "origin": "source",
             "archive": "gedit.src.tar.gz", "files": ["/gedit-docs.spec", "/gedit.spec"]},
            {"name": "broken", "base_name": "broken", "arch": "x86_64", "summary": "Bad spec"},
            {"name": "broken", "base_name": "broken", "arch": "src", "origin": "source",
             "archive": "broken.src.tar.gz", "files": ["/broken.spec"]},
            {"name": "ghost", "base_name": "ghost", "arch": "x86_64",
             "archive": "missing.tar.gz", "files": ["/usr/bin/ghost"]},
            {"summary": "row without a name"}
        ]"#;
        std::fs::write(dir.path().join("primary.json"), repository).unwrap();
        std::fs::write(
            dir.path().join("owners.json"),
            r#"{"Fedora": {"gedit": {"owner": "alice"}, "broken": {"owner": "bob"}}}"#,
        )
        .unwrap();

        Self { dir }
    }

    fn config(&self, with_owners: bool) -> IndexerConfig {
        let root = self.dir.path().display();
        let owners = if with_owners {
            format!("[owners]\npath = \"{root}/owners.json\"\nretry_delay_ms = 0\n")
        } else {
            String::new()
        };
        IndexerConfig::from_toml(&format!(
            "[index]\npath = \"{root}/index\"\n\n\
             [repository]\npath = \"{root}/primary.json\"\narchive_root = \"{root}/packages\"\n\n\
             [icons]\noutput_dir = \"{root}/icons\"\n\n{owners}"
        ))
        .unwrap()
    }

    fn documents(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(self.dir.path().join("index/documents.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

fn field_values<'a>(doc: &'a serde_json::Value, name: &str) -> Vec<&'a str> {
    doc["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|f| f["name"] == name)
        .map(|f| f["value"].as_str().unwrap())
        .collect()
}

fn find<'a>(docs: &'a [serde_json::Value], id: &str) -> &'a serde_json::Value {
    docs.iter().find(|d| d["id"] == id).unwrap()
}

#[tokio::test]
async fn test_index_repository_end_to_end() {
    let fixture = Fixture::new();
    let report = index_repository(&fixture.config(true)).await.unwrap();

    assert_eq!(report.records, 7);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.packages, 4);
    assert_eq!(report.sub_packages, 1);
    assert_eq!(report.documents, 5);
    assert_eq!(report.failed, 0);

    let docs = fixture.documents();
    assert_eq!(docs.len(), 4);

    let gedit = find(&docs, "gedit");
    assert_eq!(field_values(gedit, fields::EXACT_NAME), vec!["EX__gedit__EX"]);
    assert_eq!(
        field_values(gedit, fields::CATEGORY_TAGS),
        vec![
            "gnome",
            "EX__gnome__EX",
            "gtk",
            "EX__gtk__EX",
            "utility",
            "EX__utility__EX",
            "texteditor",
            "EX__texteditor__EX"
        ]
    );
    assert_eq!(field_values(gedit, fields::CMD), vec!["EX__gedit__EX"]);
    assert_eq!(field_values(gedit, fields::SUBPACKAGES), vec!["gedit_plugins"]);
    assert_eq!(field_values(gedit, fields::TAG), vec!["desktop"]);

    let payload: PackageEntry = serde_json::from_value(gedit["data"].clone()).unwrap();
    assert_eq!(payload.summary, "Text editor for the GNOME desktop");
    assert_eq!(payload.devel_owner, "alice");
    assert_eq!(payload.icon, "accessories-text-editor");
    assert_eq!(payload.upstream_url.as_deref(), Some("https://wiki.gnome.org/Apps/Gedit"));
    assert_eq!(payload.sub_pkgs.len(), 1);
    assert!(gedit["data"].get("archive").is_none());

    // The largest theme icon is written under the icon directory
    let icon = fixture.dir.path().join("icons/accessories-text-editor.png");
    assert_eq!(std::fs::read_to_string(icon).unwrap(), "large");

    // A malformed spec leaves an empty upstream URL; the rest still indexes
    let broken: PackageEntry = serde_json::from_value(find(&docs, "broken")["data"].clone()).unwrap();
    assert_eq!(broken.upstream_url.as_deref(), Some(""));
    assert_eq!(broken.devel_owner, "bob");

    // A payload missing on disk only loses its content facets
    let ghost = find(&docs, "ghost");
    assert_eq!(field_values(ghost, fields::CMD), vec!["EX__ghost__EX"]);
    assert!(field_values(ghost, fields::TAG).is_empty());

    let schema: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture.dir.path().join("index/schema.json")).unwrap())
            .unwrap();
    assert_eq!(schema.as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_index_without_owner_directory() {
    let fixture = Fixture::new();
    index_repository(&fixture.config(false)).await.unwrap();

    let docs = fixture.documents();
    let gedit: PackageEntry = serde_json::from_value(find(&docs, "gedit")["data"].clone()).unwrap();
    assert_eq!(gedit.devel_owner, "");
}

#[tokio::test]
async fn test_missing_repository_keeps_the_previous_index() {
    let fixture = Fixture::new();
    index_repository(&fixture.config(true)).await.unwrap();
    let previous = fixture.documents();
    assert_eq!(previous.len(), 4);

    std::fs::remove_file(fixture.dir.path().join("primary.json")).unwrap();
    let err = index_repository(&fixture.config(true)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Repository { .. }));

    assert_eq!(fixture.documents(), previous);
    assert!(!fixture.dir.path().join("index/documents.jsonl.staged").exists());
}

#[tokio::test]
async fn test_unwritable_index_is_a_setup_failure() {
    let fixture = Fixture::new();
    std::fs::write(fixture.dir.path().join("index"), "a file, not a directory").unwrap();

    let err = index_repository(&fixture.config(true)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Setup(_)));
}
