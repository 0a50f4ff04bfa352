// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

use heartwood::merkle::{Trie, EMPTY_TRIE_HASH};
use heartwood::storage::MemStore;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::cell::RefCell;
use std::sync::Arc;

const ITERATIONS: usize = 200;

fn bytes_gen(rng: &RefCell<StdRng>) -> impl Fn() -> Vec<u8> + '_ {
    move || {
        let len = rng.borrow_mut().gen_range(1..32);
        (0..len).map(|_| rng.borrow_mut().gen()).collect()
    }
}

#[test]
fn insert_persist_reload_loop() {
    let rng = RefCell::new(StdRng::seed_from_u64(42));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut trie = Trie::new(EMPTY_TRIE_HASH, store.clone());
    for _ in 0..ITERATIONS {
        let key = gen();
        let value = gen();

        let seen_before = trie.get(&key).is_some();
        let old_root = trie.root();

        let next = trie.insert(&key, &value).unwrap();
        next.persist().unwrap();

        // the receiver is the version it always was
        assert_eq!(trie.get(&key).is_some(), seen_before);
        assert_eq!(trie.root(), old_root);

        // a fresh handle over the persisted root sees the write
        let reloaded = Trie::new(next.root(), store.clone());
        assert_eq!(reloaded.get(&key), Some(value));

        trie = reloaded;
    }
}

#[test]
fn insert_loop_without_persisting() {
    let rng = RefCell::new(StdRng::seed_from_u64(43));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut trie = Trie::new(EMPTY_TRIE_HASH, store);
    for _ in 0..ITERATIONS {
        let key = gen();
        let value = gen();

        let seen_before = trie.get(&key).is_some();
        let old_root = trie.root();

        let next = trie.insert(&key, &value).unwrap();

        assert_eq!(trie.get(&key).is_some(), seen_before);
        assert_eq!(trie.root(), old_root);
        assert_eq!(next.get(&key), Some(value));

        // nothing was ever written to the store, yet the whole version
        // chain stays readable through the journals
        trie = next;
    }
}

#[test]
fn old_root_never_resolves_the_descendants_mapping() {
    let rng = RefCell::new(StdRng::seed_from_u64(44));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut trie = Trie::new(EMPTY_TRIE_HASH, store.clone());
    for _ in 0..ITERATIONS {
        let key = gen();
        let value = gen();

        let seen_before = trie.get(&key).is_some();
        let next = trie.insert(&key, &value).unwrap();
        next.persist().unwrap();

        // reload at the ancestor root: the descendant's write is invisible
        trie = Trie::new(trie.root(), store.clone());
        assert_eq!(trie.get(&key).is_some(), seen_before);
    }
}

#[test]
fn deleting_everything_restores_the_empty_root() {
    let rng = RefCell::new(StdRng::seed_from_u64(45));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut kvs = Vec::new();
    let mut trie = Trie::new(EMPTY_TRIE_HASH, store);
    for _ in 0..ITERATIONS {
        let (key, value) = (gen(), gen());
        trie = trie.insert(&key, &value).unwrap();
        kvs.push((key, value));
    }

    for (key, _) in &kvs {
        let seen_in_old = trie.get(key).is_some();
        let old_root = trie.root();

        let next = trie.delete(key).unwrap();

        assert_eq!(trie.get(key).is_some(), seen_in_old);
        assert_eq!(trie.root(), old_root);
        assert_eq!(next.get(key), None);

        trie = next;
    }

    assert_eq!(trie.root(), EMPTY_TRIE_HASH);
}

#[test]
fn deletes_survive_persist_and_reload() {
    let rng = RefCell::new(StdRng::seed_from_u64(46));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut kvs = Vec::new();
    let mut trie = Trie::new(EMPTY_TRIE_HASH, store.clone());
    for _ in 0..ITERATIONS {
        let (key, value) = (gen(), gen());
        trie = trie.insert(&key, &value).unwrap();
        kvs.push((key, value));
    }
    trie.persist().unwrap();

    for (key, _) in &kvs {
        let seen_in_old = trie.get(key).is_some();

        let next = Trie::new(trie.root(), store.clone()).delete(key).unwrap();

        assert_eq!(trie.get(key).is_some(), seen_in_old);
        assert_eq!(next.get(key), None);

        next.persist().unwrap();
        let reloaded = Trie::new(next.root(), store.clone());
        assert_eq!(reloaded.get(key), None);

        trie = next;
    }
}

#[test]
fn delete_then_reinsert_restores_the_root() {
    let rng = RefCell::new(StdRng::seed_from_u64(47));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut kvs = Vec::new();
    let mut trie = Trie::new(EMPTY_TRIE_HASH, store.clone());
    for _ in 0..3 {
        let (key, value) = (gen(), gen());
        trie = trie.insert(&key, &value).unwrap();
        kvs.push((key, value));
    }

    let root = trie.root();
    trie.persist().unwrap();

    let (key, value) = &kvs[2];
    let trie = Trie::new(root, store.clone());
    let trie = trie.delete(key).unwrap();
    let trie = trie.insert(key, value).unwrap();
    assert_eq!(trie.root(), root);

    trie.persist().unwrap();
    let reloaded = Trie::new(trie.root(), store);
    assert_eq!(reloaded.get(key), Some(value.clone()));
}

#[test]
fn every_key_survives_a_single_persist() {
    let rng = RefCell::new(StdRng::seed_from_u64(48));
    let gen = bytes_gen(&rng);
    let store = Arc::new(MemStore::new());

    let mut keys = Vec::new();
    let mut trie = Trie::new(EMPTY_TRIE_HASH, store.clone());
    for _ in 0..ITERATIONS {
        let key = gen();
        trie = trie.insert(&key, gen()).unwrap();
        keys.push(key);
    }
    trie.persist().unwrap();

    // the reloaded view answers every key exactly as the journaled one does
    let reloaded = Trie::new(trie.root(), store);
    for key in keys {
        assert!(reloaded.get(&key).is_some(), "missing key {key:?}");
        assert_eq!(trie.get(&key), reloaded.get(&key));
    }
}
