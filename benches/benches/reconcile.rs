// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use kurbo::Size;
use strata_engine::{GeoPoint, HandleId, HeadlessEngine};
use strata_scene::{
    GroupDescriptor, LayerDescriptor, LayerProps, LayerSource, SceneConfig, SceneNode, SceneTree,
};
use strata_view::{ViewDescriptor, ViewState};

fn scene(groups: usize, layers_per_group: usize, opacity: f64) -> Vec<SceneNode> {
    let children = (0..groups)
        .map(|g| {
            let layers = (0..layers_per_group)
                .map(|l| {
                    let source = LayerSource::Tile {
                        url: format!("https://t{l}.example.org/{{z}}/{{x}}/{{y}}.png"),
                        projection: None,
                    };
                    SceneNode::layer(
                        format!("g{g}/l{l}"),
                        LayerDescriptor::new(source).with_props(LayerProps {
                            opacity,
                            ..LayerProps::default()
                        }),
                    )
                })
                .collect();
            SceneNode::group(format!("g{g}"), GroupDescriptor::default()).with_children(layers)
        })
        .collect();
    vec![
        SceneNode::view(
            "camera",
            ViewDescriptor::new(ViewState::new(GeoPoint::new(0.0, 0.0), 3.0)),
        )
        .with_children(children),
    ]
}

fn mounted(nodes: &[SceneNode]) -> (HeadlessEngine, HandleId, SceneTree) {
    let mut engine = HeadlessEngine::new();
    let map = engine.create_map(Size::new(1024.0, 768.0));
    let mut tree = SceneTree::new(SceneConfig::default());
    tree.render(&mut engine, Some(map), nodes, &mut (), &mut ())
        .expect("bench scene is valid");
    engine.clear_mutations();
    (engine, map, tree)
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("strata_scene");
    group.sample_size(50);

    for &(groups, layers) in &[(4_usize, 8_usize), (16, 16), (64, 16)] {
        let same = scene(groups, layers, 1.0);
        let faded = scene(groups, layers, 0.5);

        group.bench_function(format!("mount(g={groups},l={layers})"), |b| {
            b.iter_batched(
                || {
                    let mut engine = HeadlessEngine::new();
                    let map = engine.create_map(Size::new(1024.0, 768.0));
                    (engine, map, SceneTree::new(SceneConfig::default()))
                },
                |(mut engine, map, mut tree)| {
                    tree.render(&mut engine, Some(map), &same, &mut (), &mut ())
                        .expect("bench scene is valid");
                    black_box(tree.len());
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_function(format!("rerender_unchanged(g={groups},l={layers})"), |b| {
            let (mut engine, map, mut tree) = mounted(&same);
            b.iter(|| {
                tree.render(&mut engine, Some(map), black_box(&same), &mut (), &mut ())
                    .expect("bench scene is valid");
            });
        });

        group.bench_function(format!("patch_opacity(g={groups},l={layers})"), |b| {
            b.iter_batched(
                || mounted(&same),
                |(mut engine, map, mut tree)| {
                    tree.render(&mut engine, Some(map), &faded, &mut (), &mut ())
                        .expect("bench scene is valid");
                    black_box(engine.mutation_count());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
