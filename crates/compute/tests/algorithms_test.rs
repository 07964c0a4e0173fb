//! Built-in algorithms run end to end through the job manager.

mod common;

use superstep_compute::algorithms::UNVISITED;
use superstep_compute::{AlgorithmConfig, JobConfig, JobState, RunOptions};

use common::{clique, engine_with_graph, run_to_end, values, GRAPH};

#[tokio::test]
async fn connected_components_labels_each_clique_with_its_minimum() {
    let mut pairs = clique(0..=9);
    pairs.extend(clique(10..=20));
    let engine = engine_with_graph(0..=20, &pairs).await;

    let job = engine
        .manager
        .create(JobConfig::new(AlgorithmConfig::ConnectedComponents, GRAPH, GRAPH).with_partitions(4))
        .await
        .unwrap();
    let status = run_to_end(&engine.manager, job, RunOptions::default()).await;
    assert_eq!(status.state, JobState::Completed, "{:?}", status.diagnostic);

    let records = engine.manager.result(job).await.unwrap();
    assert_eq!(records.len(), 21);
    let labels = values::<u64>(&records);
    for id in 0..=9 {
        assert_eq!(labels[&id], 0, "vertex {id}");
    }
    for id in 10..=20 {
        assert_eq!(labels[&id], 10, "vertex {id}");
    }
    assert_eq!(records[3].to_string(), "3 0");
}

#[tokio::test]
async fn bfs_measures_hops_across_a_bridge() {
    let mut pairs = clique(0..=9);
    pairs.extend(clique(10..=20));
    pairs.push((9, 10));
    let engine = engine_with_graph(0..=21, &pairs).await;

    let job = engine
        .manager
        .create(JobConfig::new(AlgorithmConfig::Bfs { source: 0 }, GRAPH, GRAPH))
        .await
        .unwrap();
    let status = run_to_end(&engine.manager, job, RunOptions::default()).await;
    assert_eq!(status.state, JobState::Completed);
    // 0 -> {1..9} -> 10 via the bridge -> {11..20}, then nothing is left.
    assert_eq!(status.superstep, 4);

    let hops = values::<u64>(&engine.manager.result(job).await.unwrap());
    assert_eq!(hops[&0], 0);
    for id in 1..=9 {
        assert_eq!(hops[&id], 1, "vertex {id}");
    }
    assert_eq!(hops[&10], 2);
    for id in 11..=20 {
        assert_eq!(hops[&id], 3, "vertex {id}");
    }
    assert_eq!(hops[&21], UNVISITED);
}

#[tokio::test]
async fn page_rank_on_a_cycle_is_uniform_and_sums_to_one() {
    let engine = engine_with_graph(0..4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).await;

    let job = engine
        .manager
        .create(JobConfig::new(
            AlgorithmConfig::PageRank {
                damping: 0.85,
                tolerance: 1e-6,
                max_iterations: 50,
            },
            GRAPH,
            GRAPH,
        ))
        .await
        .unwrap();
    let status = run_to_end(&engine.manager, job, RunOptions::default()).await;
    assert_eq!(status.state, JobState::Completed);
    assert!(status.metrics.supersteps_completed < 50);

    let ranks = values::<f64>(&engine.manager.result(job).await.unwrap());
    let total: f64 = ranks.values().sum();
    assert!((total - 1.0).abs() < 1e-6, "ranks sum to {total}");
    for rank in ranks.values() {
        assert!((rank - 0.25).abs() < 1e-6, "expected 0.25, got {rank}");
    }
}

#[tokio::test]
async fn page_rank_favours_the_hub_of_a_star() {
    let pairs: Vec<(u64, u64)> = (1..=6).flat_map(|i| [(i, 0), (0, i)]).collect();
    let engine = engine_with_graph(0..=6, &pairs).await;

    let job = engine
        .manager
        .create(JobConfig::new(
            AlgorithmConfig::PageRank {
                damping: 0.85,
                tolerance: 1e-4,
                max_iterations: 30,
            },
            GRAPH,
            GRAPH,
        ))
        .await
        .unwrap();
    let status = run_to_end(&engine.manager, job, RunOptions::default()).await;
    assert_eq!(status.state, JobState::Completed);

    let ranks = values::<f64>(&engine.manager.result(job).await.unwrap());
    for spoke in 1..=6 {
        assert!(ranks[&0] > 2.0 * ranks[&spoke]);
    }
}

#[tokio::test]
async fn results_do_not_depend_on_partition_count() {
    let mut pairs = clique(0..=4);
    pairs.extend([(4, 5), (5, 4), (5, 6), (6, 5), (7, 8), (8, 7)]);
    let engine = engine_with_graph(0..=8, &pairs).await;

    let mut outcomes = Vec::new();
    for partitions in [1, 2, 3, 7] {
        let job = engine
            .manager
            .create(
                JobConfig::new(AlgorithmConfig::ConnectedComponents, GRAPH, GRAPH)
                    .with_partitions(partitions),
            )
            .await
            .unwrap();
        run_to_end(&engine.manager, job, RunOptions::default()).await;
        outcomes.push(engine.manager.result(job).await.unwrap());
    }
    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    let labels = values::<u64>(&outcomes[0]);
    assert_eq!(labels[&6], 0);
    assert_eq!(labels[&8], 7);
}
