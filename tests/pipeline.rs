//! End-to-end checks over the narrative pipeline: normalization, pruning,
//! TF-IDF and topic inference on small accident-style corpora.

use narrative_topics::{
    build_dtm, perplexity_sweep, prepare_corpus, tfidf, DropReason, DtmOptions, GibbsLDA, LDAConfig, Narrative,
    Normalizer, TfIdfParams,
};

fn narratives(texts: &[&str]) -> Vec<Narrative> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Narrative::new(format!("2001{i:04}X"), *t))
        .collect()
}

/// Two causal families: engine/fuel problems and weather encounters.
fn accident_corpus() -> Vec<Narrative> {
    narratives(&[
        "The pilot's inadequate preflight, which resulted in fuel exhaustion and a total loss of engine power.",
        "Fuel starvation due to the pilot's improper fuel tank selection; loss of engine power.",
        "Carburetor icing and the resulting loss of engine power during cruise flight.",
        "Total loss of engine power due to fuel contamination.",
        "The pilot's continued VFR flight into instrument meteorological conditions and spatial disorientation.",
        "Encounter with a gusting crosswind during landing and the pilot's failure to maintain directional control.",
        "The pilot's failure to maintain directional control in gusting crosswind conditions.",
        "Continued flight into instrument meteorological conditions, resulting in spatial disorientation.",
        "the and of",
        "",
    ])
}

#[test]
fn three_document_example_vocabulary() {
    let docs = narratives(&["engine failure occurred", "failure during landing", "smooth landing no failure"]);
    let corpus = prepare_corpus(&docs, &Normalizer::english(), &DtmOptions::with_bounds(0.0, 1.0)).unwrap();
    assert_eq!(corpus.vocabulary().terms(), ["engine", "failure", "landing", "occurred", "smooth"]);
    assert_eq!(corpus.counts().n_rows(), 3);
    assert!(corpus.dropped().is_empty());
}

#[test]
fn rare_term_is_pruned_at_two_percent() {
    let mut docs: Vec<Vec<String>> = (0..99).map(|_| vec!["engine".to_string(), "power".to_string()]).collect();
    docs.push(vec!["engine".into(), "hydroplaning".into()]);
    let dtm = build_dtm(&docs, &DtmOptions::with_bounds(0.02, 1.0)).unwrap();
    assert!(dtm.vocabulary().index_of("hydroplaning").is_none());
    assert!(dtm.vocabulary().index_of("engine").is_some());
    assert_eq!(dtm.counts().n_rows(), 100);
}

#[test]
fn stop_word_narrative_is_dropped_but_resolvable() {
    let docs = accident_corpus();
    let corpus = prepare_corpus(&docs, &Normalizer::english(), &DtmOptions::with_bounds(0.0, 1.0)).unwrap();
    assert_eq!(corpus.counts().n_rows(), 8);
    assert_eq!(corpus.row_ids().len(), 8);
    assert_eq!(corpus.drop_reason(&docs[8].id), Some(DropReason::EmptyAfterNormalization));
    assert_eq!(corpus.drop_reason(&docs[9].id), Some(DropReason::EmptyAfterNormalization));
    assert_eq!(corpus.row_of(&docs[3].id), Some(3));
}

#[test]
fn tfidf_rows_align_with_count_rows() {
    let corpus = prepare_corpus(&accident_corpus(), &Normalizer::english(), &DtmOptions::with_bounds(0.0, 0.8)).unwrap();
    let weights = tfidf(corpus.counts(), TfIdfParams::default()).unwrap();
    assert_eq!(weights.n_rows(), corpus.counts().n_rows());
    assert_eq!(weights.n_cols(), corpus.vocabulary().len());
    let df = corpus.counts().document_frequencies();
    for (row, (counts, weighted)) in corpus.counts().rows().zip(weights.rows()).enumerate() {
        assert_eq!(counts.len(), weighted.len(), "row {row}");
        for (&(j, c), &(j2, w)) in counts.iter().zip(weighted) {
            assert_eq!(j, j2);
            assert!(w >= 0.0);
            assert!(c > 0);
        }
        // equal counts: the rarer term never weighs less
        for &(a, ca) in counts {
            for &(b, cb) in counts {
                if ca == cb && df[a] < df[b] {
                    assert!(weights.get(row, a).unwrap() >= weights.get(row, b).unwrap());
                }
            }
        }
    }
}

#[test]
fn topic_fit_is_reproducible_and_normalized() {
    let corpus = prepare_corpus(&accident_corpus(), &Normalizer::english(), &DtmOptions::with_bounds(0.0, 0.8)).unwrap();
    let config = LDAConfig {
        iterations: 100,
        seed: 2024,
        ..LDAConfig::with_topics(2)
    };
    let a = GibbsLDA::new(config.clone()).fit(corpus.counts()).unwrap();
    let b = GibbsLDA::new(config).fit(corpus.counts()).unwrap();
    assert_eq!(a.theta, b.theta);
    assert_eq!(a.beta, b.beta);
    assert_eq!(a.theta.len(), corpus.row_ids().len());
    for row in a.theta.iter().chain(&a.beta) {
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
    let topics = a.topics(corpus.vocabulary(), 5);
    assert!(topics.iter().all(|t| t.words.len() == 5));
}

#[test]
fn sweep_gives_one_score_per_candidate() {
    let corpus = prepare_corpus(&accident_corpus(), &Normalizer::english(), &DtmOptions::with_bounds(0.0, 0.8)).unwrap();
    let base = LDAConfig {
        iterations: 50,
        ..Default::default()
    };
    let points = perplexity_sweep(corpus.counts(), &[2, 4, 6], &base).unwrap();
    assert_eq!(points.iter().map(|p| p.k).collect::<Vec<_>>(), vec![2, 4, 6]);
    assert!(points.iter().all(|p| p.perplexity > 1.0 && p.perplexity <= corpus.vocabulary().len() as f64 * 2.0));
}
