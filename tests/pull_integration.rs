mod common;

use common::{journal_body, local_reconnector, walk_ctx, walk_ctx_with};
use scbox::mtime;
use scbox::remote::mock::{MockRemote, RemoteTree};
use scbox::sync;

// Pull a three-level remote tree into an empty directory: content,
// timestamps and directory creation journaling all line up.
#[test]
fn pull_materializes_nested_tree() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        t.add_file("/top.txt", b"0", 1_704_000_000);
        t.add_file("/a/mid.txt", b"1", 1_704_000_001);
        t.add_file("/a/b/deep.txt", b"2", 1_704_000_002);
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = walk_ctx(&tree, dir.path(), &[]);

    sync::pull_tree(&mut ctx, "/", dir.path()).expect("pull");

    assert_eq!(std::fs::read(dir.path().join("top.txt")).expect("read"), b"0");
    assert_eq!(std::fs::read(dir.path().join("a/mid.txt")).expect("read"), b"1");
    assert_eq!(std::fs::read(dir.path().join("a/b/deep.txt")).expect("read"), b"2");
    assert_eq!(mtime::local_mtime(&dir.path().join("a/b/deep.txt")), Some(1_704_000_002));
    assert_eq!(ctx.stats.files_downloaded, 3);
    assert_eq!(ctx.stats.dirs_created, 2);

    let body = journal_body(&ctx);
    assert!(body.contains("created carpeta a"));
    assert!(body.contains("created carpeta b"));
    assert!(body.contains("downloaded archivo deep.txt"));
}

// A second pull with no remote change downloads nothing.
#[test]
fn pull_is_idempotent() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        t.add_file("/a/mid.txt", b"1", 1_704_000_001);
        t.add_file("/a/b/deep.txt", b"2", 1_704_000_002);
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = walk_ctx(&tree, dir.path(), &[]);
    sync::pull_tree(&mut ctx, "/", dir.path()).expect("first pull");
    let journal_after_first = journal_body(&ctx);

    let mut ctx = walk_ctx(&tree, dir.path(), &[]);
    sync::pull_tree(&mut ctx, "/", dir.path()).expect("second pull");

    assert_eq!(ctx.stats.files_downloaded, 0);
    assert_eq!(ctx.stats.bytes_transferred, 0);
    assert_eq!(journal_body(&ctx), journal_after_first);
}

// A remote scb.log never lands on top of the local journal, even when the
// user's ignore list is empty.
#[test]
fn pull_leaves_local_journal_alone() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        t.add_file("/scb.log", b"remote history", 2_000_000_000);
        t.add_file("/data.txt", b"d", 1_704_000_000);
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = walk_ctx(&tree, dir.path(), &[]);

    sync::pull_tree(&mut ctx, "/", dir.path()).expect("pull");

    let local_log = std::fs::read_to_string(dir.path().join("scb.log")).expect("read journal");
    assert!(local_log.starts_with("Log iniciado - "));
    assert!(!local_log.contains("remote history"));
    assert!(dir.path().join("data.txt").exists());
}

// Severing the transport mid-file reconnects and finishes the walk; the
// destination is never observable half-written.
#[test]
fn pull_recovers_from_a_severed_transfer() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        t.add_file("/x/big.bin", &[42u8; 64 * 1024], 1_709_251_200);
        t.add_file("/x/small.txt", b"s", 1_709_251_200);
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = MockRemote::connect(tree.clone());
    session.sever_retrieve_after = Some(16 * 1024);
    let mut ctx = walk_ctx_with(&tree, dir.path(), &[], session);
    let (reconnector, _listener) = local_reconnector();
    ctx.holder.set_reconnector(reconnector);

    sync::pull_tree(&mut ctx, "/x", &dir.path().join("x")).expect("pull");

    let big = std::fs::read(dir.path().join("x/big.bin")).expect("read big");
    assert_eq!(big.len(), 64 * 1024);
    assert!(big.iter().all(|b| *b == 42));
    assert!(!dir.path().join("x/big.bin.tmp").exists());
    assert!(dir.path().join("x/small.txt").exists());
    // one fresh session was built after the initial one died
    assert_eq!(tree.lock().unwrap().connects, 2);
    assert_eq!(ctx.holder.rotations(), 1);
}

// A factory that only produces dead sessions exhausts the retry budget.
#[test]
fn pull_gives_up_after_max_retries() {
    let tree = RemoteTree::shared();
    tree.lock().unwrap().add_file("/x/a.txt", b"a", 1);
    let dir = tempfile::tempdir().expect("tempdir");

    let mut first = MockRemote::connect(tree.clone());
    first.kill();
    let factory_tree = tree.clone();
    let holder = scbox::reconnect::SessionHolder::new(
        Box::new(first),
        Box::new(move || {
            let mut s = MockRemote::connect(factory_tree.clone());
            s.kill();
            Ok(Box::new(s) as Box<dyn scbox::remote::RemoteStore>)
        }),
    );
    let ignore = scbox::ignore::IgnoreSet::build(&[]).expect("ignore");
    let journal =
        scbox::journal::Journal::with_user(dir.path(), "test".into()).expect("journal");
    let mut ctx = scbox::sync::WalkContext::new(holder, ignore, journal);
    let (reconnector, _listener) = local_reconnector();
    ctx.holder.set_reconnector(reconnector);

    let err = sync::pull_tree(&mut ctx, "/x", &dir.path().join("x")).unwrap_err();
    assert!(matches!(err, scbox::SyncError::RetriesExhausted(_)));
}

// Proactive session rotation after the download threshold.
#[test]
fn pull_rotates_the_session_at_the_threshold() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        for i in 0..scbox::reconnect::ROTATE_AFTER_DOWNLOADS {
            t.add_file(&format!("/bulk/file{:03}.dat", i), b"x", 1_704_000_000);
        }
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = walk_ctx(&tree, dir.path(), &[]);

    sync::pull_tree(&mut ctx, "/bulk", &dir.path().join("bulk")).expect("pull");

    assert_eq!(ctx.stats.files_downloaded, scbox::reconnect::ROTATE_AFTER_DOWNLOADS as u64);
    assert_eq!(ctx.holder.rotations(), 1);
    assert_eq!(ctx.holder.downloads_since_rotate(), 0);
    assert_eq!(tree.lock().unwrap().connects, 2);
}

// Starting the walk at a subpath touches nothing outside it.
#[test]
fn pull_from_a_subpath_stays_inside_it() {
    let tree = RemoteTree::shared();
    {
        let mut t = tree.lock().unwrap();
        t.add_file("/a/b/inside.txt", b"in", 1_704_000_000);
        t.add_file("/outside.txt", b"out", 1_704_000_000);
        t.add_file("/a/sibling.txt", b"sib", 1_704_000_000);
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = walk_ctx(&tree, dir.path(), &[]);

    sync::pull_tree(&mut ctx, "/a/b", &dir.path().join("a/b")).expect("pull");

    assert!(dir.path().join("a/b/inside.txt").exists());
    assert!(!dir.path().join("outside.txt").exists());
    assert!(!dir.path().join("a/sibling.txt").exists());
    assert_eq!(ctx.stats.files_downloaded, 1);
}
