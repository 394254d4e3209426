use cabsync_core::time::from_unix;
use cabsync_core::{
    codec, cryptor, Cabinet, CipherKind, Error, MemoryTransport, Node, NodeId, Result,
    StoreHandle, Transport,
};

const PASSWORD: &str = "abcd1234";
const PATH: &str = "vault.xml";

fn wallet(password: &str) -> Cabinet {
    let mut cabinet = Cabinet::restore(
        NodeId::new("c1"),
        from_unix(1_000),
        from_unix(2_000),
        "Wallet",
        password,
    )
    .unwrap();
    let mut folder = Node::restore_folder(
        NodeId::new("f1"),
        from_unix(1_100),
        from_unix(1_900),
        "Bank",
    )
    .unwrap();
    folder
        .graft_child(
            Node::restore_card(NodeId::new("k1"), from_unix(1_200), from_unix(1_200), "Chase")
                .unwrap(),
        )
        .unwrap();
    cabinet.graft_child(folder).unwrap();
    cabinet
}

fn seeded_transport(cabinet: &Cabinet, cipher: CipherKind) -> MemoryTransport {
    let text = codec::encode(cabinet).unwrap();
    let payload = cryptor::encrypt_with(&text, cabinet.password(), cipher);
    MemoryTransport::with_file(PATH, &payload)
}

#[test]
fn create_then_reopen_preserves_the_tree() {
    let tree = wallet(PASSWORD);
    let handle = StoreHandle::create(MemoryTransport::new(), PATH, tree.clone()).unwrap();
    assert!(!handle.cabinet().is_dirty());

    let payload = handle.transport().contents(PATH).unwrap().to_string();
    let reopened = StoreHandle::open(MemoryTransport::with_file(PATH, &payload), PATH, PASSWORD)
        .unwrap();
    assert!(reopened.cabinet().structural_eq(&tree));
    assert_eq!(reopened.cabinet().cipher(), CipherKind::Current);
    assert!(!reopened.cabinet().is_dirty());
}

#[test]
fn save_is_idempotent_for_a_clean_tree() {
    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();

    // clean tree: no I/O at all
    handle.save().unwrap();
    assert_eq!(handle.transport().write_count(), 0);

    handle.cabinet_mut().children_mut()[0].set_label("Banking");
    handle.save().unwrap();
    let writes_after_dirty_save = handle.transport().write_count();
    assert!(writes_after_dirty_save > 0);

    // a second save with no intervening mutation performs no further I/O
    handle.save().unwrap();
    assert_eq!(handle.transport().write_count(), writes_after_dirty_save);
}

#[test]
fn save_cleans_up_its_temporary_file() {
    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();
    handle.cabinet_mut().set_label("Renamed");
    handle.save().unwrap();
    assert!(!handle.transport().exists(&format!("{PATH}.tmp")));
}

#[test]
fn legacy_file_opens_via_fallback_and_migrates_on_save() {
    let tree = wallet(PASSWORD);
    let transport = seeded_transport(&tree, CipherKind::Legacy);

    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();
    assert_eq!(handle.cabinet().cipher(), CipherKind::Legacy);
    assert!(handle.cabinet().is_dirty(), "legacy open must schedule a re-save");
    assert!(handle.cabinet().structural_eq(&tree));

    handle.save().unwrap();
    assert_eq!(handle.cabinet().cipher(), CipherKind::Current);

    // the file is now readable under the current cipher alone
    let payload = handle.transport().contents(PATH).unwrap();
    let text = cryptor::decrypt(payload, PASSWORD, CipherKind::Current).unwrap();
    assert!(codec::decode(&text).unwrap().structural_eq(&tree));
}

#[test]
fn wrong_password_fails_to_open() {
    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    assert!(matches!(
        StoreHandle::open(transport, PATH, "wrong123"),
        Err(Error::Decryption(_))
    ));
}

#[test]
fn declared_password_mismatch_is_an_authentication_error() {
    // document declares a password but sits on disk unencrypted; opening
    // with the empty password decrypts "successfully" and must then trip
    // over the declared attribute
    let tree = wallet(PASSWORD);
    let transport = MemoryTransport::with_file(PATH, &codec::encode(&tree).unwrap());
    assert!(matches!(
        StoreHandle::open(transport, PATH, ""),
        Err(Error::Authentication(_))
    ));
}

#[test]
fn password_length_is_validated() {
    let transport = MemoryTransport::new();
    assert!(matches!(
        StoreHandle::open(transport, PATH, "short"),
        Err(Error::Authentication(_))
    ));

    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();
    assert!(matches!(
        handle.save_as("other.xml", "waytoolongpassword"),
        Err(Error::Authentication(_))
    ));
}

#[test]
fn save_as_changes_path_and_password() {
    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();

    handle.save_as("other.xml", "efgh5678").unwrap();
    assert_eq!(handle.path(), "other.xml");
    assert_eq!(handle.cabinet().password(), "efgh5678");
    assert!(!handle.cabinet().is_dirty());
    // the old file stays behind untouched
    assert!(handle.transport().exists(PATH));

    let payload = handle.transport().contents("other.xml").unwrap().to_string();
    let reopened = StoreHandle::open(
        MemoryTransport::with_file("other.xml", &payload),
        "other.xml",
        "efgh5678",
    )
    .unwrap();
    assert_eq!(reopened.cabinet().label(), "Wallet");
}

#[test]
fn save_picks_up_a_password_changed_on_the_cabinet() {
    let transport = seeded_transport(&wallet(PASSWORD), CipherKind::Current);
    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();
    handle.cabinet_mut().set_password("efgh5678");
    handle.save().unwrap();

    let payload = handle.transport().contents(PATH).unwrap().to_string();
    let reopened =
        StoreHandle::open(MemoryTransport::with_file(PATH, &payload), PATH, "efgh5678").unwrap();
    assert_eq!(reopened.cabinet().password(), "efgh5678");
}

/// Transport that silently corrupts every write to a `.tmp` path, to prove
/// the read-back verification gates promotion to the real file.
struct CorruptingTransport {
    inner: MemoryTransport,
}

impl Transport for CorruptingTransport {
    fn read(&self, path: &str) -> Result<String> {
        self.inner.read(path)
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        if path.ends_with(".tmp") {
            self.inner.write(path, "<!-- damaged in transit -->")
        } else {
            self.inner.write(path, contents)
        }
    }

    fn create(&mut self, path: &str, initial: &str) -> Result<()> {
        self.inner.create(path, initial)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.inner.delete(path)
    }
}

#[test]
fn failed_verification_leaves_the_original_file_untouched() {
    let tree = wallet(PASSWORD);
    let text = codec::encode(&tree).unwrap();
    let payload = cryptor::encrypt(&text, PASSWORD);
    let transport = CorruptingTransport {
        inner: MemoryTransport::with_file(PATH, &payload),
    };

    let mut handle = StoreHandle::open(transport, PATH, PASSWORD).unwrap();
    handle.cabinet_mut().set_label("Mutated");
    let err = handle.save().unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));

    // original bytes survive, the temp file does not
    assert_eq!(handle.transport().read(PATH).unwrap(), payload);
    assert!(!handle.transport().exists(&format!("{PATH}.tmp")));
    // and the tree is still considered unsaved
    assert!(handle.cabinet().is_dirty());
}
