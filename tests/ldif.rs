use ironrecon::directory::{
    AddContent, Attribute, AttributeValue, ChangeMapper, ChangeRecord, ChangeType, Content, LdifReader, LdifWriter,
    ModifyContent, ModifyOp, NamespaceSubstitution,
};
use ironrecon::error::{Error, ParseErrorKind};
use ironrecon::reconcile::{ReconcileOptions, Reconciler};
use ironrecon::record::Transaction;
use ironrecon::testing::*;
use std::io::Cursor;

fn render(changes: &[ChangeRecord], wrap: Option<usize>) -> String {
    let mut w = LdifWriter::new(Vec::new());
    if let Some(col) = wrap {
        w = w.with_wrap_column(col).unwrap();
    }
    w.write_version().unwrap();
    for c in changes {
        w.write_change(c).unwrap();
    }
    assert_eq!(w.records_written(), changes.len() as u64);
    String::from_utf8(w.into_inner().unwrap()).unwrap()
}

fn read(text: &str) -> Vec<ChangeRecord> {
    LdifReader::new(Cursor::new(text.as_bytes().to_vec()))
        .collect::<ironrecon::Result<_>>()
        .unwrap()
}

fn sample_changes() -> Vec<ChangeRecord> {
    let mut add = AddContent::default();
    add.add_attribute(Attribute::text("objectClass", ["top", "inetOrgPerson"]));
    add.add_attribute(Attribute::text("cn", ["Zoë Ångström"]));
    add.add_attribute(Attribute::new("jpegPhoto").with_value(vec![0xffu8, 0xd8, 0x00]));
    add.add_attribute(Attribute::text("description", [" leading space", "a very long description that will certainly need folding"]));

    let mut modify = ModifyContent::default();
    modify.push(ModifyOp::Replace, Attribute::text("mail", ["x@y"]));
    modify.push(ModifyOp::Remove, Attribute::new("telephoneNumber"));
    modify.push(ModifyOp::Add, Attribute::text("cn", ["A", "B"]));

    vec![
        ChangeRecord::add("uid=zoe,ou=People,dc=example,dc=com", add),
        ChangeRecord::delete("uid=gone,ou=People,dc=example,dc=com"),
        ChangeRecord::modify("uid=jdoe,ou=People,dc=example,dc=com", modify),
    ]
}

#[test]
fn modify_replace_serializes_as_documented() {
    let mut m = ModifyContent::default();
    m.push(ModifyOp::Replace, Attribute::text("mail", ["x@y"]));
    let text = render(&[ChangeRecord::modify("uid=a,dc=x", m)], None);
    assert_eq!(
        text,
        "version: 1\n\ndn: uid=a,dc=x\nchangetype: modify\nreplace: mail\nmail: x@y\n-\n"
    );
}

#[test]
fn writer_output_reads_back() {
    let changes = sample_changes();
    for wrap in [None, Some(20), Some(76)] {
        let text = render(&changes, wrap);
        if let Some(col) = wrap {
            assert!(text.lines().all(|l| l.chars().count() <= col), "{text}");
        }
        assert_eq!(read(&text), changes, "wrap {wrap:?}");
    }
}

#[test]
fn unsafe_values_are_base64_encoded() {
    let text = render(&sample_changes(), None);
    assert!(text.contains("cn:: "));
    assert!(text.contains("jpegPhoto:: /9gA\n"));
    assert!(text.contains("description:: "));
    assert!(text.contains("objectClass: inetOrgPerson\n"));
}

#[test]
fn delete_content_rejects_attributes() {
    let mut content = Content::Delete(Default::default());
    let err = content.add_attribute(Attribute::text("cn", ["x"])).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)));
    assert_eq!(content.change_type(), ChangeType::Delete);
}

#[test]
fn moddn_records_are_rejected() {
    let err = LdifReader::new(Cursor::new("dn: uid=a\nchangetype: moddn\nnewrdn: uid=b\n"))
        .next_change()
        .unwrap_err();
    assert_eq!(err.parse_kind(), Some(ParseErrorKind::UnsupportedChangeType));
}

#[test]
fn namespace_substitution_rewrites_suffix_only() {
    let ns = NamespaceSubstitution::new("dc=example,dc=com", "dc=corp,dc=net");
    assert_eq!(ns.apply("uid=a,ou=People,DC=Example, dc=com"), "uid=a,ou=People,dc=corp,dc=net");
    assert_eq!(ns.apply("dc=example,dc=com"), "dc=corp,dc=net");
    assert_eq!(ns.apply("uid=a,dc=otherexample,dc=com"), "uid=a,dc=otherexample,dc=com");
}

#[test]
fn reconciled_snapshots_become_ldif() {
    let d = people_descriptor();
    let old = SnapshotBuilder::new(&d)
        .row(["ann", "Ann", "ann@x", "123"])
        .row(["bob", "Bob", "bob@x", ""])
        .build();
    let new = SnapshotBuilder::new(&d)
        .row(["bob", "Bob", "robert@x", "555"])
        .row(["cid", "Cid", "cid@x|c@x", ""])
        .build();
    let (deltas, _) = Reconciler::new(d.clone(), ReconcileOptions::default())
        .unwrap()
        .reconcile(as_source(old), as_source(new))
        .unwrap();
    assert_transactions(
        &deltas,
        &[
            (Transaction::Delete, "ann"),
            (Transaction::Update, "bob"),
            (Transaction::Create, "cid"),
        ],
    );

    let mapper = ChangeMapper::new(d, "uid={uid},ou=People,dc=example,dc=com")
        .unwrap()
        .with_object_classes(["inetOrgPerson"])
        .with_value_separator("|")
        .with_namespace(NamespaceSubstitution::new("dc=example,dc=com", "dc=corp,dc=net"));
    let changes: Vec<ChangeRecord> = deltas.iter().filter_map(|x| mapper.map(x)).collect();
    let text = render(&changes, None);
    assert_eq!(
        text,
        "version: 1\n\
         \n\
         dn: uid=ann,ou=People,dc=corp,dc=net\n\
         changetype: delete\n\
         \n\
         dn: uid=bob,ou=People,dc=corp,dc=net\n\
         changetype: modify\n\
         replace: mail\n\
         mail: robert@x\n\
         -\n\
         add: telephoneNumber\n\
         telephoneNumber: 555\n\
         -\n\
         \n\
         dn: uid=cid,ou=People,dc=corp,dc=net\n\
         changetype: add\n\
         objectClass: inetOrgPerson\n\
         uid: cid\n\
         cn: Cid\n\
         mail: cid@x\n\
         mail: c@x\n"
    );
    let back = read(&text);
    assert_eq!(back, changes);
    assert_eq!(
        back[2].content,
        Content::Add({
            let mut add = AddContent::default();
            add.add_attribute(Attribute::text("objectClass", ["inetOrgPerson"]));
            add.add_attribute(Attribute::text("uid", ["cid"]));
            add.add_attribute(Attribute::text("cn", ["Cid"]));
            add.add_attribute(Attribute::new("mail").with_value("cid@x").with_value(AttributeValue::from("c@x")));
            add
        })
    );
}
