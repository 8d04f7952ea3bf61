#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scbox::ignore::IgnoreSet;
use scbox::journal::Journal;
use scbox::reconnect::{Reconnector, SessionHolder};
use scbox::remote::RemoteStore;
use scbox::remote::mock::{MockRemote, RemoteTree};
use scbox::sync::WalkContext;

/// Walk context over a shared mock tree, with a factory handing out fresh
/// sessions over the same tree so reconnects and rotations can be observed.
pub fn walk_ctx(tree: &Arc<Mutex<RemoteTree>>, root: &Path, patterns: &[&str]) -> WalkContext {
    walk_ctx_with(tree, root, patterns, MockRemote::connect(tree.clone()))
}

/// Same, but starting from a caller-prepared session (fault injection).
pub fn walk_ctx_with(
    tree: &Arc<Mutex<RemoteTree>>,
    root: &Path,
    patterns: &[&str],
    session: MockRemote,
) -> WalkContext {
    let factory_tree = tree.clone();
    let holder = SessionHolder::new(
        Box::new(session),
        Box::new(move || {
            Ok(Box::new(MockRemote::connect(factory_tree.clone())) as Box<dyn RemoteStore>)
        }),
    );
    let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
    let ignore = IgnoreSet::build(&patterns).expect("ignore set");
    let journal = Journal::with_user(root, "test".into()).expect("journal");
    WalkContext::new(holder, ignore, journal)
}

/// A reconnector whose reachability probe points at a local listener, so
/// reconnect paths run without touching the real network. Keep the
/// listener alive for the duration of the test.
pub fn local_reconnector() -> (Reconnector, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let probe_addr = listener.local_addr().expect("probe addr").to_string();
    (
        Reconnector {
            probe_addr,
            ceiling: Duration::from_secs(2),
            poll: Duration::from_millis(10),
        },
        listener,
    )
}

pub fn write_file(path: &Path, data: &[u8], mtime: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, data).expect("write file");
    scbox::mtime::set_local_mtime(path, mtime).expect("stamp file");
}

pub fn journal_body(ctx: &WalkContext) -> String {
    std::fs::read_to_string(ctx.journal.path()).expect("journal body")
}
