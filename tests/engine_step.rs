use jeans_engine::eval::{AsyncEvaluator, AsyncFitness};
use jeans_engine::exec::{InlineExecutor, RayonExecutor, TokioExecutor};
use jeans_engine::ops::{Alterer, AltererResult, Selector, TournamentSelector};
use jeans_engine::{
    Engine, EngineBuilder, EngineError, EvolutionStart, Fitness, Optimize, Phenotype, Population,
};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Takes the first `count` individuals.
struct Head;

impl Selector<i64, i64> for Head {
    fn select(
        &self,
        population: &Population<i64, i64>,
        count: usize,
        _: Optimize,
    ) -> Population<i64, i64> {
        population.iter().take(count).cloned().collect()
    }
}

/// Takes the last `count` individuals.
struct Tail;

impl Selector<i64, i64> for Tail {
    fn select(
        &self,
        population: &Population<i64, i64>,
        count: usize,
        _: Optimize,
    ) -> Population<i64, i64> {
        let skip = population.len() - count;
        population.iter().skip(skip).cloned().collect()
    }
}

/// Panics on the first call only.
#[derive(Default)]
struct FailsOnce {
    failed: AtomicBool,
}

impl Selector<i64, i64> for FailsOnce {
    fn select(
        &self,
        population: &Population<i64, i64>,
        count: usize,
        optimize: Optimize,
    ) -> Population<i64, i64> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            panic!("selector failed");
        }
        Head.select(population, count, optimize)
    }
}

/// Adds one to every genotype.
struct Increment;

impl Alterer<i64, i64> for Increment {
    fn alter(&self, population: Population<i64, i64>, generation: u64) -> AltererResult<i64, i64> {
        let count = population.len();
        let altered = population
            .iter()
            .map(|pt| pt.new_instance(pt.genotype() + 1, generation))
            .collect();
        AltererResult::new(altered, count)
    }
}

fn deterministic() -> EngineBuilder<i64, i64> {
    Engine::builder(|x: &i64| *x, || 1_000_i64)
        .population_size(10)
        .offspring_size(6)
        .survivors_selector(Head)
        .offspring_selector(Tail)
        .maximal_phenotype_age(100)
        .executor(InlineExecutor)
}

fn random() -> EngineBuilder<i64, i64> {
    Engine::builder(|x: &i64| -(x - 42).abs(), || rand::thread_rng().gen_range(-500_i64..500))
        .selector(TournamentSelector::new(2))
        .alterer(Increment)
}

fn genotypes(population: &Population<i64, i64>) -> Vec<i64> {
    population.iter().map(|pt| *pt.genotype()).collect()
}

#[test]
fn identity_step_returns_input_unchanged() {
    let engine = deterministic().build().unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    let result = engine.evolve_start(&input).unwrap();
    assert_eq!(genotypes(&result.population), (0..10).collect::<Vec<_>>());
    for (output, original) in result.population.iter().zip(input.population()) {
        assert!(output.same_instance(original));
        assert_eq!(output.fitness(), Some(original.genotype()));
    }
    assert_eq!(result.kill_count, 0);
    assert_eq!(result.invalid_count, 0);
    assert!(result.durations.evolve >= result.durations.evaluation);
}

#[test]
fn output_size_matches_configuration() {
    for (size, fraction) in [(1, 0.6), (2, 0.0), (7, 1.0), (31, 0.3)] {
        let engine = random()
            .population_size(size)
            .offspring_fraction(fraction)
            .executor(RayonExecutor::with_threads(3).unwrap())
            .build()
            .unwrap();
        let mut start = engine.evolution_start_from_genotypes(Vec::new(), 1);
        for _ in 0..4 {
            let result = engine.evolve_start(&start).unwrap();
            assert_eq!(result.population.len(), size);
            assert!(result.population.iter().all(Phenotype::is_evaluated));
            start = result.next_start();
        }
    }
}

#[test]
fn every_individual_is_replaced_at_age_zero() {
    let engine = deterministic().maximal_phenotype_age(0).build().unwrap();
    let input: Population<i64, i64> = (0..10)
        .map(|x| Phenotype::new(x, 0, engine.fitness().clone()))
        .collect();
    let result = engine.evolve(&input, 5).unwrap();
    assert_eq!(result.kill_count, 10);
    assert_eq!(result.invalid_count, 0);
    assert!(result.population.iter().all(|pt| pt.generation() == 5));
}

#[test]
fn no_survivor_exceeds_the_maximal_age() {
    let engine = random()
        .population_size(20)
        .maximal_phenotype_age(3)
        .executor(InlineExecutor)
        .build()
        .unwrap();
    let mut start = engine.evolution_start_from_genotypes(Vec::new(), 1);
    for _ in 0..10 {
        let result = engine.evolve_start(&start).unwrap();
        let generation = result.generation;
        assert!(result.population.iter().all(|pt| pt.age(generation) <= 3));
        start = result.next_start();
    }
}

#[test]
fn exhausted_retries_keep_invalid_individuals() {
    let engine = deterministic()
        .phenotype_validator(|_: &Phenotype<i64, i64>| false)
        .individual_creation_retries(0)
        .build()
        .unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    let result = engine.evolve_start(&input).unwrap();
    assert_eq!(result.invalid_count, 10);
    assert_eq!(result.population.len(), 10);
    assert!(result.population.iter().all(|pt| pt.genotype() == &1_000));
}

#[test]
fn replacements_account_for_every_changed_position() {
    let engine = deterministic()
        .genotype_validator(|x: &i64| x % 3 != 0)
        .maximal_phenotype_age(1)
        .build()
        .unwrap();
    let input: Population<i64, i64> = (0..10)
        .map(|x| Phenotype::new(x, if x < 5 { 1 } else { 3 }, engine.fitness().clone()))
        .collect();
    let result = engine.evolve(&input, 3).unwrap();
    // Survivors are the first four, offspring the last six.
    let selected: Vec<&Phenotype<i64, i64>> =
        input.iter().take(4).chain(input.iter().skip(4)).collect();
    let changed = result
        .population
        .iter()
        .zip(selected)
        .filter(|(output, original)| !output.same_instance(original))
        .count();
    assert_eq!(changed, result.kill_count + result.invalid_count);
    assert_eq!(result.invalid_count, 4);
    assert_eq!(result.kill_count, 3);
}

#[test]
fn alterations_are_reported() {
    let engine = deterministic().alterer(Increment).build().unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    let result = engine.evolve_start(&input).unwrap();
    assert_eq!(result.alter_count, 6);
    assert_eq!(
        genotypes(&result.population),
        vec![0, 1, 2, 3, 5, 6, 7, 8, 9, 10]
    );
}

#[test]
fn failing_step_leaves_engine_usable() {
    let engine = deterministic().survivors_selector(FailsOnce::default()).build().unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    match engine.evolve_start(&input) {
        Err(EngineError::TaskPanicked { message }) => assert!(message.contains("selector failed")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(engine.evolve_start(&input).unwrap().population.len(), 10);
}

#[test]
fn batch_evaluation_count_is_checked() {
    let engine = deterministic()
        .genotype_evaluator(|genotypes: &[&i64], _: &Fitness<i64, i64>| -> Vec<i64> {
            genotypes.iter().skip(1).map(|x| **x).collect()
        })
        .build()
        .unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    assert_eq!(
        engine.evolve_start(&input).unwrap_err(),
        EngineError::EvaluationCountMismatch {
            expected: 10,
            found: 9
        }
    );
}

#[test]
fn batch_evaluation_scores_the_population() {
    let engine = deterministic()
        .genotype_evaluator(|genotypes: &[&i64], fitness: &Fitness<i64, i64>| -> Vec<i64> {
            genotypes.iter().map(|x| fitness.eval(x) * 2).collect()
        })
        .build()
        .unwrap();
    let input = engine.evolution_start_from_genotypes(0..10, 1);
    let result = engine.evolve_start(&input).unwrap();
    assert_eq!(result.best_fitness(), Some(&18));
    assert_eq!(result.worst_phenotype().map(|pt| *pt.genotype()), Some(0));
}

#[test]
fn one_engine_serves_concurrent_callers() {
    let engine = Arc::new(
        random()
            .population_size(24)
            .executor(RayonExecutor::with_threads(4).unwrap())
            .build()
            .unwrap(),
    );
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut start = engine.evolution_start_from_genotypes(Vec::new(), 1);
                for _ in 0..5 {
                    let result = engine.evolve_start(&start).unwrap();
                    assert_eq!(result.population.len(), 24);
                    start = result.next_start();
                }
                start.generation()
            })
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 6);
    }
}

#[test]
fn minimizing_engine_reports_smallest_score_as_best() {
    let engine = Engine::builder(|x: &i64| x.abs(), || rand::thread_rng().gen_range(-100_i64..100))
        .minimizing()
        .population_size(30)
        .executor(RayonExecutor::global())
        .build()
        .unwrap();
    let start = engine.evolution_start_from_genotypes(Vec::new(), 1);
    let result = engine.evolve_start(&start).unwrap();
    let smallest = result.population.iter().filter_map(|pt| pt.fitness().copied()).min();
    assert_eq!(result.optimize, Optimize::Minimum);
    assert_eq!(result.best_fitness().copied(), smallest);
}

#[test]
fn stages_run_on_a_tokio_blocking_pool() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .build()
        .unwrap();
    let engine = random()
        .population_size(12)
        .executor(TokioExecutor::new(runtime.handle().clone()))
        .build()
        .unwrap();
    let start = engine.evolution_start_from_genotypes(Vec::new(), 1);
    assert_eq!(engine.evolve_start(&start).unwrap().population.len(), 12);
}

struct RemoteDistance;

#[async_trait::async_trait]
impl AsyncFitness<i64, i64> for RemoteDistance {
    async fn fitness(&self, genotype: &i64) -> i64 {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        -(genotype - 42).abs()
    }
}

#[test]
fn async_fitness_drives_the_step() {
    let engine = random()
        .population_size(8)
        .executor(InlineExecutor)
        .evaluator(AsyncEvaluator::with_max_concurrency(RemoteDistance, 4).unwrap())
        .build()
        .unwrap();
    let start = engine.evolution_start_from_genotypes(vec![42], 1);
    let result = engine.evolve_start(&start).unwrap();
    assert!(result.population.iter().all(Phenotype::is_evaluated));
    assert_eq!(result.population.len(), 8);
}

#[test]
fn foreign_individuals_are_rescored() {
    let engine = deterministic().build().unwrap();
    let other = Fitness::new(|x: &i64| -x);
    let population: Population<i64, i64> = (0..3)
        .map(|x| Phenotype::new(x, 1, other.clone()).evaluate())
        .collect();
    let start = engine.evolution_start(EvolutionStart::new(population, 1));
    assert_eq!(start.population().len(), 10);
    let result = engine.evolve_start(&start).unwrap();
    assert_eq!(result.population[2].fitness(), Some(&2));
}
