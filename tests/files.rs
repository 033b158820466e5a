use anyhow::Result;
use ironrecon::config::{InputFormat, ReconcileConfig};
use ironrecon::error::{Error, ParseErrorKind};
use ironrecon::io::{Dialect, FixedColumn, FlatLayout};
use ironrecon::reconcile::{FileJob, ReconcileStats, reconcile_files, reconcile_files_to_ldif, reconcile_many};
use ironrecon::sort::sort_file_in_place;
use ironrecon::testing::*;

fn people_config() -> ReconcileConfig {
    ReconcileConfig::new(PEOPLE_FIELDS, &["uid"])
}

fn snapshots(dir: &SnapshotDir, old_name: &str, new_name: &str) -> Result<()> {
    let d = people_descriptor();
    let old = SnapshotBuilder::new(&d)
        .row(["ann", "Ann", "ann@x", ""])
        .row(["bob", "Bob", "bob@x", "555"])
        .row(["dan", "Dan", "dan@x", ""])
        .build();
    let new = SnapshotBuilder::new(&d)
        .row(["bob", "Bob", "bob@y", "555"])
        .row(["cid", "Cid, Jr", "cid@x", ""])
        .row(["dan", "Dan", "dan@x", ""])
        .build();
    dir.write_delimited(old_name, &d, &Dialect::comma(), &old)?;
    dir.write_delimited(new_name, &d, &Dialect::comma(), &new)?;
    Ok(())
}

#[test]
fn delimited_output_has_transaction_column() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let stats = reconcile_files(&people_config(), dir.file("old.csv"), dir.file("new.csv"), dir.file("out/delta.csv"))?;

    assert_eq!(
        dir.read_text("out/delta.csv")?,
        "TRANSACTION,uid,cn,mail,telephoneNumber\n\
         DEL,ann,Ann,ann@x,\n\
         UPD,bob,Bob,bob@y,555\n\
         CRE,cid,\"Cid, Jr\",cid@x,\n"
    );
    assert_eq!((stats.created, stats.updated, stats.deleted, stats.unchanged), (1, 1, 1, 1));
    assert_stats_consistent(&stats);
    Ok(())
}

#[test]
fn emit_unchanged_writes_nil_rows() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let config = ReconcileConfig {
        emit_unchanged: true,
        ..people_config()
    };
    reconcile_files(&config, dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.csv"))?;
    assert!(dir.read_text("delta.csv")?.ends_with("NIL,dan,Dan,dan@x,\n"));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn compressed_snapshots_are_read_transparently() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv.gz", "new.csv")?;
    let raw = std::fs::read(dir.file("old.csv.gz"))?;
    assert_eq!(&raw[..2], &[0x1f_u8, 0x8b]);

    let stats = reconcile_files(&people_config(), dir.file("old.csv.gz"), dir.file("new.csv"), dir.file("delta.csv"))?;
    assert_eq!(stats.old_records, 3);
    assert_eq!(stats.processed, 4);
    Ok(())
}

#[test]
fn ldif_output_uses_the_dn_template() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let mut config = people_config();
    config.ldif.dn_template = "uid={uid},ou=People,dc=example,dc=com".into();
    config.ldif.object_classes = vec!["inetOrgPerson".into()];

    let stats = reconcile_files_to_ldif(&config, dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.ldif"))?;
    assert_eq!(stats.processed, 4);
    assert_eq!(
        dir.read_text("delta.ldif")?,
        "version: 1\n\
         \n\
         dn: uid=ann,ou=People,dc=example,dc=com\n\
         changetype: delete\n\
         \n\
         dn: uid=bob,ou=People,dc=example,dc=com\n\
         changetype: modify\n\
         replace: mail\n\
         mail: bob@y\n\
         -\n\
         \n\
         dn: uid=cid,ou=People,dc=example,dc=com\n\
         changetype: add\n\
         objectClass: inetOrgPerson\n\
         uid: cid\n\
         cn: Cid, Jr\n\
         mail: cid@x\n"
    );
    Ok(())
}

#[test]
fn ldif_output_requires_a_template() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let err = reconcile_files_to_ldif(&people_config(), dir.file("old.csv"), dir.file("new.csv"), dir.file("x.ldif"))
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
    assert!(!dir.file("x.ldif").exists());
    Ok(())
}

#[test]
fn failed_run_leaves_previous_output_in_place() -> Result<()> {
    let dir = SnapshotDir::new()?;
    dir.write_text("old.csv", "uid,cn,mail,telephoneNumber\nann,Ann,ann@x,\nbob,\"Bob,bob@x,\n")?;
    dir.write_text("new.csv", "uid,cn,mail,telephoneNumber\nann,Ann,ann@x,\n")?;
    dir.write_text("delta.csv", "previous run\n")?;

    let err = reconcile_files(&people_config(), dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.csv"))
        .unwrap_err();
    let cause = err.chain().find_map(|e| e.downcast_ref::<Error>());
    assert_eq!(cause.and_then(Error::parse_kind), Some(ParseErrorKind::MissingQuoteClose));
    assert_eq!(dir.read_text("delta.csv")?, "previous run\n");
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 3);
    Ok(())
}

#[test]
fn missing_header_column_fails_before_writing() -> Result<()> {
    let dir = SnapshotDir::new()?;
    dir.write_text("old.csv", "uid,cn\nann,Ann\n")?;
    dir.write_text("new.csv", "uid,cn,mail,telephoneNumber\n")?;
    let err = reconcile_files(&people_config(), dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.csv"))
        .unwrap_err();
    let cause = err.chain().find_map(|e| e.downcast_ref::<Error>());
    assert_eq!(cause.and_then(Error::parse_kind), Some(ParseErrorKind::MissingHeader));
    assert!(!dir.file("delta.csv").exists());
    Ok(())
}

#[test]
fn unsorted_inputs_are_sorted_on_request() -> Result<()> {
    let dir = SnapshotDir::new()?;
    let d = people_descriptor();
    let old = generate_people(57, 21);
    let new = evolve_people(&old, 22, 5);
    let mut shuffled_old = old.clone();
    shuffled_old.reverse();
    let mut shuffled_new = new.clone();
    shuffled_new.rotate_left(new.len() / 3);
    dir.write_delimited("old.csv", &d, &Dialect::comma(), &shuffled_old)?;
    dir.write_delimited("new.csv", &d, &Dialect::comma(), &shuffled_new)?;
    dir.write_delimited("old.sorted.csv", &d, &Dialect::comma(), &old)?;
    dir.write_delimited("new.sorted.csv", &d, &Dialect::comma(), &new)?;

    let config = ReconcileConfig {
        sort_inputs: true,
        chunk_size: 8,
        ..people_config()
    };
    let sorted_stats = reconcile_files(&config, dir.file("old.csv"), dir.file("new.csv"), dir.file("a.csv"))?;
    let reference = reconcile_files(&people_config(), dir.file("old.sorted.csv"), dir.file("new.sorted.csv"), dir.file("b.csv"))?;
    assert_eq!(sorted_stats, ReconcileStats { chunks_merged: sorted_stats.chunks_merged, ..reference });
    assert_eq!(dir.read_text("a.csv")?, dir.read_text("b.csv")?);
    Ok(())
}

#[test]
fn flat_inputs_with_comments() -> Result<()> {
    let dir = SnapshotDir::new()?;
    dir.write_text("old.txt", "# people export\nann|Ann|ann@x|\nbob|Bob|bob@x|555\n")?;
    dir.write_text("new.txt", "# people export\nann|Ann|ann@x|\nbob|Bob|bob@x|556\n")?;
    let config = ReconcileConfig {
        input: InputFormat::Flat {
            layout: FlatLayout::Delimited { separator: '|' },
        },
        ..people_config()
    };
    let stats = reconcile_files(&config, dir.file("old.txt"), dir.file("new.txt"), dir.file("delta.csv"))?;
    assert_eq!(stats.updated, 1);
    assert_eq!(dir.read_text("delta.csv")?, "UPD|bob|Bob|bob@x|556\n");
    Ok(())
}

#[test]
fn fixed_width_inputs_give_fixed_width_output() -> Result<()> {
    let dir = SnapshotDir::new()?;
    dir.write_text("old.txt", "ann  Ann  ann@x\nbob  Bob  bob@x     555\n")?;
    dir.write_text("new.txt", "bob  Bob  bob@y     555\ncid  Cid  cid@x\n")?;
    let columns = [(0, 5), (5, 5), (10, 10), (20, 4)]
        .into_iter()
        .map(|(start, len)| FixedColumn { start, len })
        .collect();
    let config = ReconcileConfig {
        input: InputFormat::Flat {
            layout: FlatLayout::Fixed { columns },
        },
        ..people_config()
    };
    let stats = reconcile_files(&config, dir.file("old.txt"), dir.file("new.txt"), dir.file("delta.txt"))?;
    assert_eq!((stats.created, stats.updated, stats.deleted), (1, 1, 1));
    assert_eq!(
        dir.read_text("delta.txt")?,
        "DELann  Ann  ann@x\n\
         UPDbob  Bob  bob@y     555\n\
         CREcid  Cid  cid@x\n"
    );
    Ok(())
}

#[test]
fn directory_exports_reconcile_to_ldif() -> Result<()> {
    let dir = SnapshotDir::new()?;
    dir.write_text(
        "old.ldif",
        "version: 1\n\n\
         dn: uid=ann,ou=People,dc=example,dc=com\n\
         objectClass: inetOrgPerson\n\
         uid: ann\ncn: Ann\nmail: ann@x\n\n\
         dn: uid=bob,ou=People,dc=example,dc=com\n\
         uid: bob\ncn: Bob\nmail: bob@x\nmail: robert@x\n",
    )?;
    dir.write_text(
        "new.ldif",
        "dn: uid=bob,ou=People,dc=example,dc=com\n\
         uid: bob\ncn: Bob\nmail: bob@x\nmail: rob@x\ntelephoneNumber: 555\n\n\
         dn: uid=cid,ou=People,dc=example,dc=com\n\
         uid: cid\ncn: Cid\n",
    )?;
    let mut config = ReconcileConfig {
        input: InputFormat::Ldif,
        ..people_config()
    };
    config.ldif.value_separator = Some("|".into());
    config.ldif.dn_template = "uid={uid},ou=People,dc=example,dc=com".into();

    let stats = reconcile_files_to_ldif(&config, dir.file("old.ldif"), dir.file("new.ldif"), dir.file("delta.ldif"))?;
    assert_eq!((stats.old_records, stats.new_records), (2, 2));
    assert_eq!(
        dir.read_text("delta.ldif")?,
        "version: 1\n\
         \n\
         dn: uid=ann,ou=People,dc=example,dc=com\n\
         changetype: delete\n\
         \n\
         dn: uid=bob,ou=People,dc=example,dc=com\n\
         changetype: modify\n\
         replace: mail\n\
         mail: bob@x\n\
         mail: rob@x\n\
         -\n\
         add: telephoneNumber\n\
         telephoneNumber: 555\n\
         -\n\
         \n\
         dn: uid=cid,ou=People,dc=example,dc=com\n\
         changetype: add\n\
         uid: cid\n\
         cn: Cid\n"
    );

    reconcile_files(&config, dir.file("old.ldif"), dir.file("new.ldif"), dir.file("delta.csv"))?;
    assert!(dir.read_text("delta.csv")?.contains("UPD,bob,Bob,bob@x|rob@x,555\n"));
    Ok(())
}

#[test]
fn identical_snapshots_can_skip_the_output() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    std::fs::copy(dir.file("old.csv"), dir.file("same.csv"))?;
    let mut config = ReconcileConfig {
        skip_empty_output: true,
        ..people_config()
    };
    let stats = reconcile_files(&config, dir.file("old.csv"), dir.file("same.csv"), dir.file("delta.csv"))?;
    assert_eq!((stats.changes(), stats.unchanged), (0, 3));
    assert!(!dir.file("delta.csv").exists());

    dir.write_text("delta.ldif", "previous run\n")?;
    config.ldif.dn_template = "uid={uid},dc=example,dc=com".into();
    reconcile_files_to_ldif(&config, dir.file("old.csv"), dir.file("same.csv"), dir.file("delta.ldif"))?;
    assert_eq!(dir.read_text("delta.ldif")?, "previous run\n");
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 4);

    reconcile_files(&config, dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.csv"))?;
    assert!(dir.read_text("delta.csv")?.starts_with("TRANSACTION,"));
    Ok(())
}

#[test]
fn many_jobs_report_individually() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let mut config = people_config();
    config.ldif.dn_template = "uid={uid},dc=example,dc=com".into();
    let jobs = vec![
        FileJob::delimited(dir.file("old.csv"), dir.file("new.csv"), dir.file("one.csv")),
        FileJob::delimited(dir.file("missing.csv"), dir.file("new.csv"), dir.file("two.csv")),
        FileJob::ldif(dir.file("old.csv"), dir.file("new.csv"), dir.file("three.ldif")),
    ];
    let results = reconcile_many(&config, &jobs);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().map(|s| s.processed).ok(), Some(4));
    assert!(results[1].is_err());
    assert!(!dir.file("two.csv").exists());
    assert_eq!(results[2].as_ref().map(|s| s.created).ok(), Some(1));
    assert!(dir.read_text("three.ldif")?.starts_with("version: 1\n"));
    Ok(())
}

#[test]
fn sort_in_place_orders_by_key() -> Result<()> {
    let dir = SnapshotDir::new()?;
    let d = ironrecon::record::Descriptor::new(["id", "name"], &["id"])?.numeric("id")?;
    let rows: Vec<_> = ["10", "9", "100", "1", "55"]
        .iter()
        .map(|id| d.record([*id, "x"]))
        .collect();
    let path = dir.write_delimited("ids.csv", &d, &Dialect::semicolon(), &rows)?;
    let n = sort_file_in_place(&path, &Dialect::semicolon(), &d, 2)?;
    assert_eq!(n, 5);
    assert_eq!(dir.read_text("ids.csv")?, "id;name\n1;x\n9;x\n10;x\n55;x\n100;x\n");
    Ok(())
}

#[test]
fn config_file_drives_a_run() -> Result<()> {
    let dir = SnapshotDir::new()?;
    snapshots(&dir, "old.csv", "new.csv")?;
    let cfg = dir.write_text(
        "job.json",
        r#"{
            "fields": ["uid", "cn", "mail", "telephoneNumber"],
            "key": ["uid"],
            "chunk_size": 1,
            "ldif": {
                "dn_template": "uid={uid},ou=People,dc=example,dc=com",
                "namespace": { "source": "dc=example,dc=com", "target": "dc=corp,dc=net" },
                "wrap_column": 40
            }
        }"#,
    )?;
    let config = ReconcileConfig::from_json_file(cfg)?;
    assert_eq!(config.chunk_size, 1);
    reconcile_files_to_ldif(&config, dir.file("old.csv"), dir.file("new.csv"), dir.file("delta.ldif"))?;
    let text = dir.read_text("delta.ldif")?;
    assert!(text.contains("dn: uid=ann,ou=People,dc=corp,dc=net\n"));
    assert!(text.lines().all(|l| l.chars().count() <= 40));
    Ok(())
}
