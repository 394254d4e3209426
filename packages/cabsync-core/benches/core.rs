use std::hint::black_box;

use cabsync_core::time::from_unix;
use cabsync_core::{codec, synchronize, Cabinet, Node, NodeId};
use criterion::{criterion_group, criterion_main, Criterion};

fn build_tree(folders: usize, cards: usize, entries: usize) -> Cabinet {
    let at = from_unix(1_000);
    let mut cabinet = Cabinet::restore(NodeId::new("root"), at, at, "Vault", "abcd1234").unwrap();
    for fi in 0..folders {
        let mut folder =
            Node::restore_folder(NodeId::new(format!("f{fi}")), at, at, format!("Folder {fi}"))
                .unwrap();
        for ci in 0..cards {
            let mut card = Node::restore_card(
                NodeId::new(format!("f{fi}c{ci}")),
                at,
                at,
                format!("Card {ci}"),
            )
            .unwrap();
            for ei in 0..entries {
                card.graft_child(
                    Node::restore_single_line(
                        NodeId::new(format!("f{fi}c{ci}e{ei}")),
                        at,
                        at,
                        format!("Entry {ei}"),
                        "some moderately sized secret value",
                    )
                    .unwrap(),
                )
                .unwrap();
            }
            folder.graft_child(card).unwrap();
        }
        cabinet.graft_child(folder).unwrap();
    }
    cabinet
}

fn bench_codec(c: &mut Criterion) {
    let tree = build_tree(10, 10, 4);
    let text = codec::encode(&tree).unwrap();

    c.bench_function("codec_encode", |b| {
        b.iter(|| codec::encode(black_box(&tree)).unwrap())
    });
    c.bench_function("codec_decode", |b| {
        b.iter(|| codec::decode(black_box(&text)).unwrap())
    });
}

fn bench_synchronize(c: &mut Criterion) {
    let local = build_tree(10, 10, 4);
    let mut remote = local.clone();
    // diverge: remote loses a folder, gains a post-watermark one
    remote.extract_child(&NodeId::new("f3"));
    let at = from_unix(3_000);
    remote
        .graft_child(Node::restore_folder(NodeId::new("fresh"), at, at, "Fresh").unwrap())
        .unwrap();

    c.bench_function("synchronize_divergent", |b| {
        b.iter(|| {
            let mut l = local.clone();
            let mut r = remote.clone();
            synchronize(&mut l, &mut r, from_unix(2_000)).unwrap()
        })
    });
}

criterion_group!(benches, bench_codec, bench_synchronize);
criterion_main!(benches);
