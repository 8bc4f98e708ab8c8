/*!
 * Lifecycle Tests
 * Fork replication, close-on-exec, exit teardown and queue overflow
 */

mod common;

use common::{closed, open, run, Mailboxes, ScriptTransport};
use handle_service::core::types::HandleFlags;
use handle_service::transport::{Reply, Request};
use handle_service::{HandleError, HandleService, LocalBus, ServiceConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const A: u32 = 10;
const B: u32 = 20;
const C: u32 = 30;

fn service_on(bus: &LocalBus, config: ServiceConfig) -> HandleService<Mailboxes> {
    let (svc, producer) = HandleService::<Mailboxes>::builder()
        .config(config)
        .bus(bus.handle())
        .build(Mailboxes::new())
        .unwrap();
    bus.attach(producer);
    svc
}

#[test]
fn test_fork_child_keeps_handle_after_parent_close() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());

    // Occupy 0..3 so the parent's handle is number 3
    for _ in 0..3 {
        open(&mut svc, 99);
    }
    let (file, h) = open(&mut svc, A);
    assert_eq!(h, 3);

    assert!(bus.fork(A, B));
    let mut transport = ScriptTransport::new();
    let flags = transport.call(B, Request::GetHandleFlags { handle: 3 });
    let close = transport.call(A, Request::Close { handle: 3 });
    run(&mut svc, &mut transport);

    assert_eq!(transport.reply(flags), Some(&Reply::Flags(0)));
    assert_eq!(transport.reply(close), Some(&Reply::Done));
    assert_eq!(svc.get_file(A, 3), None);
    assert_eq!(svc.get_file(B, 3), Some(file));
    assert!(closed(&svc).is_empty());
}

#[test]
fn test_child_allocations_skip_inherited_numbers() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (_, h) = open(&mut svc, A);
    bus.fork(A, B);

    let mut transport = ScriptTransport::new();
    let opened = transport.call(
        B,
        Request::Open {
            flags: 0,
            arg: Vec::new(),
        },
    );
    run(&mut svc, &mut transport);

    let fresh = transport.handle(opened);
    assert_ne!(fresh, h);
    assert_ne!(svc.get_file(B, fresh), svc.get_file(B, h));
}

#[test]
fn test_grandchild_resolves_in_one_hop() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (file, h) = open(&mut svc, A);
    bus.fork(A, B);
    // The child is watched as soon as its fork is published
    assert!(bus.fork(B, C));

    run(&mut svc, &mut ScriptTransport::new());

    let table = svc.table();
    let shadow = table.client(C).unwrap().translate(h).unwrap();
    assert_eq!(table.handle(shadow).unwrap().owner(), C);
    assert_eq!(svc.get_file(C, h), Some(file));
}

#[test]
fn test_exec_closes_only_cloexec() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (_, keep) = open(&mut svc, A);
    let mailbox = svc.provider_mut().mailbox();
    let id = mailbox.id;
    let file = svc.new_file(Default::default(), mailbox).unwrap();
    let doomed = svc
        .add_handle(A, file, HandleFlags::CLOEXEC.bits())
        .unwrap();

    bus.exec(A);
    run(&mut svc, &mut ScriptTransport::new());

    assert!(svc.table().resolve(A, keep).is_some());
    assert!(svc.table().resolve(A, doomed).is_none());
    assert_eq!(closed(&svc), vec![id]);
}

#[test]
fn test_exit_releases_everything() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    open(&mut svc, A);
    open(&mut svc, A);
    let (_, shared) = open(&mut svc, B);

    let mut transport = ScriptTransport::new();
    transport.call(B, Request::DupTo { handle: shared, target: A });
    run(&mut svc, &mut transport);

    bus.exit(A, 0, 0, 0);
    run(&mut svc, &mut ScriptTransport::new());

    let mut ids = closed(&svc);
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert!(svc.table().client(A).is_none());
    assert!(!bus.is_watching(A));
    // B's file is still held by B
    assert_eq!(svc.stats().handles, 1);
}

#[test]
fn test_exit_cancels_parked_call() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (_, h) = open(&mut svc, A);

    let mut transport = ScriptTransport::new();
    let read = transport.call(A, Request::Read { handle: h, len: 8 });
    run(&mut svc, &mut transport);
    assert_eq!(transport.reply(read), None);

    bus.exit(A, 9, 0, 0);
    svc.serve(&mut transport).unwrap();
    assert_eq!(transport.errno(read), Some(9));
}

#[test]
fn test_exit_during_burst_applies_before_woken_call() {
    let bus = Arc::new(LocalBus::new());
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (file, h) = open(&mut svc, A);
    let w = svc.add_handle(B, file, 0).unwrap();

    let mut transport = ScriptTransport::new();
    let read = transport.call(A, Request::Read { handle: h, len: 1 });
    run(&mut svc, &mut transport);

    // A exits while B's write is in flight; the write wakes A's read
    let dying = Arc::clone(&bus);
    transport.then(move || {
        dying.exit(A, 9, 0, 0);
    });
    let wrote = transport.call(
        B,
        Request::Write {
            handle: w,
            data: b"x".to_vec(),
        },
    );
    run(&mut svc, &mut transport);

    assert_eq!(transport.reply(wrote), Some(&Reply::Count(1)));
    assert_eq!(transport.errno(read), Some(9));
    // The exited reader consumed nothing
    assert_eq!(svc.file(file).unwrap().buf.len(), 1);
}

#[test]
fn test_exit_of_silent_transfer_target_releases_handle() {
    let bus = LocalBus::new();
    let mut svc = service_on(&bus, ServiceConfig::default());
    let (_, h) = open(&mut svc, A);

    let mut transport = ScriptTransport::new();
    let sent = transport.call(A, Request::DupTo { handle: h, target: B });
    run(&mut svc, &mut transport);
    let id = transport.handle(sent);
    assert_eq!(svc.stats().transfers, 1);
    // B never called in, yet its exit is observed
    assert!(bus.is_watching(B));

    assert!(bus.exit(B, 0, 0, 0));
    run(&mut svc, &mut ScriptTransport::new());

    assert_eq!(svc.stats().transfers, 0);
    assert_eq!(svc.stats().handles, 1);
    assert!(svc.table().handle(id).is_none());
    assert!(closed(&svc).is_empty());
}

#[test]
fn test_overflow_is_reported() {
    let bus = LocalBus::new();
    let config = ServiceConfig::default()
        .with_lifecycle_capacity(1)
        .with_abort_on_overflow(false);
    let mut svc = service_on(&bus, config);
    open(&mut svc, A);

    bus.exec(A);
    bus.exec(A);

    let result = svc.serve(&mut ScriptTransport::new());
    assert_eq!(result, Err(HandleError::LifecycleOverflow));
}
