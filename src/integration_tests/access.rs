// SPDX-License-Identifier: MIT

//! Grants against the live window station and desktop.

use std::{os::windows::io::AsHandle, sync::Barrier, thread};

use crate::runtime::{
    AccessError, AccessGrantManager, LauncherConfig, SessionObject, load_profile_environment,
    token_user_sid,
};

use super::util;

const OBJECTS: [SessionObject; 2] = [SessionObject::WindowStation, SessionObject::Desktop];

#[test]
fn token_user_matches_process_user() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let sid = token_user_sid(token.as_handle()).unwrap();
    assert!(sid.to_string().starts_with("S-1-5-"), "{}", sid);
}

/// The new entries come after every existing entry, which is left untouched.
#[test]
fn grant_appends_after_existing_entries() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let sid = token_user_sid(token.as_handle()).unwrap();
    let manager = AccessGrantManager::new(&LauncherConfig::default());

    let before: Vec<_> = OBJECTS.iter().map(|o| manager.read_entries(*o).unwrap()).collect();
    manager.grant_interactive_access(&sid).unwrap();

    for (object, before) in OBJECTS.iter().zip(before) {
        let after = manager.read_entries(*object).unwrap();
        assert_eq!(after.len(), before.len() + 2, "{}", object);
        assert_eq!(after[..before.len()], before[..], "{}", object);
        let added = &after[before.len()..];
        assert!(added.iter().all(|e| e.is_allowed_for(&sid)), "{}: {:?}", object, added);
        // The generic entry may be stored with its rights already mapped.
        assert_eq!(added[1].mask, object.object_rights(), "{}", object);
    }
}

/// Entries are never deduplicated.
#[test]
fn repeated_grants_accumulate() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let sid = token_user_sid(token.as_handle()).unwrap();
    let manager = AccessGrantManager::new(&LauncherConfig::default());

    let before = manager.read_entries(SessionObject::Desktop).unwrap().len();
    manager.grant_interactive_access(&sid).unwrap();
    manager.grant_interactive_access(&sid).unwrap();
    let after = manager.read_entries(SessionObject::Desktop).unwrap();

    assert_eq!(after.len(), before + 4);
    let added = &after[before..];
    assert!(added.iter().all(|e| e.is_allowed_for(&sid)));
    assert_eq!(added[0], added[2]);
    assert_eq!(added[1], added[3]);
    assert_eq!(added[3].mask, SessionObject::Desktop.object_rights());
}

/// Grants racing from several threads are applied one after another; none is lost.
#[test]
fn concurrent_grants_are_all_kept() {
    const THREADS: usize = 8;
    let _session = util::lock_session();
    let token = util::restricted_token();
    let sid = token_user_sid(token.as_handle()).unwrap();
    let manager = AccessGrantManager::new(&LauncherConfig::default());

    let before: Vec<_> = OBJECTS.iter().map(|o| manager.read_entries(*o).unwrap()).collect();
    let start = Barrier::new(THREADS);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                start.wait();
                manager.grant_interactive_access(&sid).unwrap();
            });
        }
    });

    for (object, before) in OBJECTS.iter().zip(before) {
        let after = manager.read_entries(*object).unwrap();
        assert_eq!(after.len(), before.len() + 2 * THREADS, "{}", object);
        assert_eq!(after[..before.len()], before[..], "{}", object);
        assert!(after[before.len()..].iter().all(|e| e.is_allowed_for(&sid)), "{}", object);
    }
}

#[test]
fn missing_window_station_is_an_open_error() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let sid = token_user_sid(token.as_handle()).unwrap();
    let config = LauncherConfig::default().with_window_station("spawnas-no-such-station");
    let manager = AccessGrantManager::new(&config);

    match manager.grant_interactive_access(&sid) {
        Err(AccessError::Open { object, name, code }) => {
            assert_eq!(object, SessionObject::WindowStation);
            assert_eq!(name, "spawnas-no-such-station");
            assert_ne!(code, 0);
        }
        other => panic!("expected an open error, found {:?}", other),
    }
}

#[test]
fn profile_environment_has_system_variables() {
    let _session = util::lock_session();
    let token = util::restricted_token();
    let env = load_profile_environment(token.as_handle()).unwrap();
    assert!(env.get("SystemRoot").is_some());
    assert!(env.get("systemroot").is_some());
}
