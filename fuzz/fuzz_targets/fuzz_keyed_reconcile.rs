#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sprig_harness::{Harness, element};
use sprig_reactive::SignalList;
use sprig_runtime::VirtualNode;

#[derive(Arbitrary, Debug)]
enum ListEdit {
    Push(u8),
    Insert(u8, u8),
    Remove(u8),
    Move(u8, u8),
    Replace(Vec<u8>),
    Flush,
    Tick,
}

fn item(key: &u8) -> VirtualNode {
    // Odd keys render two natives so runs of more than one node get moved.
    if key % 2 == 1 {
        VirtualNode::fragment([element(&format!("{key}a"), []), element(&format!("{key}b"), [])])
    } else {
        element(&key.to_string(), [])
    }
}

fn expected(keys: &[u8]) -> Vec<String> {
    keys.iter()
        .flat_map(|key| {
            if key % 2 == 1 {
                vec![format!("{key}a"), format!("{key}b")]
            } else {
                vec![key.to_string()]
            }
        })
        .collect()
}

fuzz_target!(|edits: Vec<ListEdit>| {
    let list = SignalList::new(Vec::<u8>::new());
    let mut harness = Harness::new();
    harness.mount(VirtualNode::for_each(list.clone(), |key: &u8| u32::from(*key), item));

    for edit in edits.into_iter().take(256) {
        let keys = list.to_vec();
        match edit {
            ListEdit::Push(key) if !keys.contains(&key) => list.push(key),
            ListEdit::Insert(at, key) if !keys.contains(&key) => {
                list.insert(usize::from(at) % (keys.len() + 1), key);
            }
            ListEdit::Remove(at) if !keys.is_empty() => {
                list.remove(usize::from(at) % keys.len());
            }
            ListEdit::Move(from, to) if !keys.is_empty() => {
                list.move_item(usize::from(from) % keys.len(), usize::from(to) % keys.len());
            }
            ListEdit::Replace(next) => {
                let mut unique = Vec::new();
                for key in next {
                    if !unique.contains(&key) {
                        unique.push(key);
                    }
                }
                list.replace_all(unique);
            }
            ListEdit::Flush => {
                harness.flush();
            }
            ListEdit::Tick => {
                harness.tick();
            }
            _ => {}
        }
    }

    harness.flush();
    assert_eq!(harness.root_labels(), expected(&list.to_vec()));
    harness.unmount();
    assert!(harness.root_labels().is_empty());
});
