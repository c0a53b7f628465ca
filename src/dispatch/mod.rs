//! Ordered fan-out of source batches across a worker pool.
//!
//! Every dispatched batch gets its own one-slot reply channel. Slots are kept
//! in submission order, so the consumer always receives batch `n` before batch
//! `n + 1`, however the workers finish. The number of slots is capped, which
//! keeps the source from being read ahead of the writer without bound.

use arrow_array::RecordBatch;
use crossbeam_channel::{Receiver, bounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ConvertError;
use crate::pipeline::{BatchProcessor, FeatureBatch};

type BatchResult = Result<FeatureBatch, ConvertError>;

const NO_FAILURE: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub num_workers: usize,
    pub in_flight_per_worker: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            num_workers: 1,
            in_flight_per_worker: 2,
        }
    }
}

impl DispatchSettings {
    pub fn max_in_flight(&self) -> usize {
        self.num_workers.max(1) * self.in_flight_per_worker.max(1)
    }

    pub fn is_parallel(&self) -> bool {
        self.num_workers > 1
    }
}

enum Slot {
    Ready(BatchResult),
    Pending { index: usize, reply: Receiver<BatchResult> },
}

struct WorkerPool {
    pool: rayon::ThreadPool,
    pending: VecDeque<Slot>,
    max_in_flight: usize,
    first_failure: Arc<AtomicUsize>,
}

enum Mode {
    Sequential,
    Pool(WorkerPool),
}

/// Lazy, ordered sequence of transformed batches.
///
/// Yields at most one error; the sequence ends right after it.
pub struct OrderedBatches<S, P> {
    source: S,
    processor: Arc<P>,
    mode: Mode,
    next_index: usize,
    source_done: bool,
    finished: bool,
}

/// Runs `processor` over every batch of `source`, on a pool of
/// `settings.num_workers` threads when more than one is requested.
pub fn dispatch<S, P>(
    source: S,
    processor: Arc<P>,
    settings: DispatchSettings,
) -> Result<OrderedBatches<S, P>, ConvertError>
where
    S: Iterator<Item = Result<RecordBatch, ConvertError>>,
    P: BatchProcessor + 'static,
{
    let mode = if settings.is_parallel() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.num_workers)
            .thread_name(|index| format!("convert-worker-{index}"))
            .panic_handler(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Pipeline: worker panicked: {}", message);
            })
            .build()?;
        tracing::debug!(
            "Pipeline: {} workers, at most {} batches in flight",
            settings.num_workers,
            settings.max_in_flight()
        );
        Mode::Pool(WorkerPool {
            pool,
            pending: VecDeque::with_capacity(settings.max_in_flight()),
            max_in_flight: settings.max_in_flight(),
            first_failure: Arc::new(AtomicUsize::new(NO_FAILURE)),
        })
    } else {
        Mode::Sequential
    };

    Ok(OrderedBatches {
        source,
        processor,
        mode,
        next_index: 0,
        source_done: false,
        finished: false,
    })
}

impl<S, P> OrderedBatches<S, P>
where
    S: Iterator<Item = Result<RecordBatch, ConvertError>>,
    P: BatchProcessor + 'static,
{
    /// Batches submitted to workers whose results have not been consumed yet.
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        match &self.mode {
            Mode::Sequential => 0,
            Mode::Pool(workers) => workers.pending.len(),
        }
    }

    fn next_sequential(&mut self) -> Option<BatchResult> {
        let index = self.next_index;
        let batch = self.source.next()?;
        self.next_index += 1;
        Some(batch.and_then(|batch| self.processor.process_batch(index, batch)))
    }

    fn next_parallel(&mut self) -> Option<BatchResult> {
        let Mode::Pool(workers) = &mut self.mode else {
            return None;
        };

        while !self.source_done && workers.pending.len() < workers.max_in_flight {
            if workers.first_failure.load(Ordering::SeqCst) != NO_FAILURE {
                self.source_done = true;
                break;
            }
            match self.source.next() {
                None => self.source_done = true,
                Some(Err(err)) => {
                    workers.pending.push_back(Slot::Ready(Err(err)));
                    self.source_done = true;
                }
                Some(Ok(batch)) => {
                    let index = self.next_index;
                    self.next_index += 1;

                    let (reply_tx, reply_rx) = bounded(1);
                    let processor = Arc::clone(&self.processor);
                    let first_failure = Arc::clone(&workers.first_failure);
                    workers.pool.spawn(move || {
                        if index > first_failure.load(Ordering::SeqCst) {
                            return;
                        }
                        let result = processor.process_batch(index, batch);
                        if result.is_err() {
                            first_failure.fetch_min(index, Ordering::SeqCst);
                        }
                        // The consumer may have stopped listening after an earlier failure.
                        let _ = reply_tx.send(result);
                    });
                    workers.pending.push_back(Slot::Pending {
                        index,
                        reply: reply_rx,
                    });
                }
            }
        }

        let result = match workers.pending.pop_front()? {
            Slot::Ready(result) => result,
            Slot::Pending { index, reply } => reply
                .recv()
                .unwrap_or_else(|_| Err(ConvertError::WorkerLost { batch: index })),
        };
        Some(result)
    }
}

impl<S, P> Iterator for OrderedBatches<S, P>
where
    S: Iterator<Item = Result<RecordBatch, ConvertError>>,
    P: BatchProcessor + 'static,
{
    type Item = BatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let next = if matches!(self.mode, Mode::Sequential) {
            self.next_sequential()
        } else {
            self.next_parallel()
        };

        match &next {
            None => self.finished = true,
            Some(Err(err)) => {
                tracing::debug!("Pipeline: stopping dispatch after error: {}", err);
                self.finished = true;
                if let Mode::Pool(workers) = &mut self.mode {
                    let position = err.batch().unwrap_or(0);
                    workers.first_failure.fetch_min(position, Ordering::SeqCst);
                    workers.pending.clear();
                }
            }
            Some(Ok(_)) => {}
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeatureError;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use geojson::Feature;
    use serde_json::{Map, Value};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Emits one feature per row carrying the batch index and row id; completes
    /// later batches faster so workers finish out of order.
    struct EchoProcessor {
        fail_at: Option<usize>,
        panic_at: Option<usize>,
        processed: AtomicUsize,
    }

    impl EchoProcessor {
        fn new() -> Self {
            Self {
                fail_at: None,
                panic_at: None,
                processed: AtomicUsize::new(0),
            }
        }
    }

    impl BatchProcessor for EchoProcessor {
        fn process_batch(&self, index: usize, batch: RecordBatch) -> BatchResult {
            self.processed.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis((7 - (index % 7)) as u64));
            if self.panic_at == Some(index) {
                panic!("boom at batch {index}");
            }
            if self.fail_at == Some(index) {
                return Err(ConvertError::Row {
                    batch: index,
                    row: 0,
                    source: FeatureError::MissingGeometry {
                        column: "geometry".to_string(),
                    },
                });
            }

            let ids = batch
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .unwrap();
            let features = ids
                .values()
                .iter()
                .map(|id| {
                    let mut properties = Map::new();
                    properties.insert("batch".to_string(), Value::from(index));
                    properties.insert("id".to_string(), Value::from(*id));
                    Feature {
                        bbox: None,
                        geometry: None,
                        id: None,
                        properties: Some(properties),
                        foreign_members: None,
                    }
                })
                .collect();
            Ok(FeatureBatch { index, features })
        }
    }

    fn id_batch(start: i64, rows: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from_iter_values(start..start + rows))],
        )
        .unwrap()
    }

    fn source(batches: usize) -> impl Iterator<Item = Result<RecordBatch, ConvertError>> {
        (0..batches).map(|index| Ok(id_batch(index as i64 * 10, 3)))
    }

    fn settings(num_workers: usize) -> DispatchSettings {
        DispatchSettings {
            num_workers,
            ..DispatchSettings::default()
        }
    }

    fn collect(num_workers: usize, batches: usize) -> Vec<FeatureBatch> {
        dispatch(source(batches), Arc::new(EchoProcessor::new()), settings(num_workers))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn parallel_output_matches_sequential_output() {
        let sequential = collect(1, 25);
        assert_eq!(sequential.len(), 25);
        for num_workers in [2, 8] {
            assert_eq!(collect(num_workers, 25), sequential, "workers={num_workers}");
        }
    }

    #[test]
    fn batches_arrive_in_source_order() {
        let indices: Vec<usize> = collect(4, 12).iter().map(|batch| batch.index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn zero_workers_runs_sequentially() {
        let batches = dispatch(source(3), Arc::new(EchoProcessor::new()), settings(0)).unwrap();
        assert_eq!(batches.in_flight(), 0);
        assert_eq!(batches.count(), 3);
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(collect(1, 0).is_empty());
        assert!(collect(4, 0).is_empty());
    }

    #[test]
    fn source_is_pulled_lazily_with_bounded_in_flight() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = (0..1_000).map(move |index| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(id_batch(index, 1))
        });
        let settings = DispatchSettings {
            num_workers: 2,
            in_flight_per_worker: 2,
        };

        let mut batches = dispatch(source, Arc::new(EchoProcessor::new()), settings).unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 0);

        batches.next().unwrap().unwrap();
        assert!(pulled.load(Ordering::SeqCst) <= settings.max_in_flight());
        assert!(batches.in_flight() < settings.max_in_flight());

        batches.next().unwrap().unwrap();
        assert!(pulled.load(Ordering::SeqCst) <= settings.max_in_flight() + 1);
    }

    #[test]
    fn worker_error_surfaces_at_its_position() {
        for num_workers in [1, 2, 8] {
            let processor = EchoProcessor {
                fail_at: Some(3),
                ..EchoProcessor::new()
            };
            let results: Vec<BatchResult> =
                dispatch(source(10), Arc::new(processor), settings(num_workers))
                    .unwrap()
                    .collect();

            assert_eq!(results.len(), 4, "workers={num_workers}");
            for (position, result) in results[..3].iter().enumerate() {
                assert_eq!(result.as_ref().unwrap().index, position);
            }
            let err = results[3].as_ref().unwrap_err();
            assert_eq!(err.batch(), Some(3));
        }
    }

    #[test]
    fn sequential_error_stops_further_processing() {
        let processor = Arc::new(EchoProcessor {
            fail_at: Some(1),
            ..EchoProcessor::new()
        });
        let results: Vec<BatchResult> = dispatch(source(10), Arc::clone(&processor), settings(1))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(processor.processed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_error_surfaces_after_earlier_batches() {
        let source = (0..5).map(|index| {
            if index == 2 {
                Err(ConvertError::ReadBatch {
                    batch: 2,
                    source: arrow_schema::ArrowError::ParquetError("corrupt page".to_string()),
                })
            } else {
                Ok(id_batch(index, 2))
            }
        });

        let results: Vec<BatchResult> =
            dispatch(source, Arc::new(EchoProcessor::new()), settings(4))
                .unwrap()
                .collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(ConvertError::ReadBatch { batch: 2, .. })
        ));
    }

    #[test]
    fn worker_panic_is_reported_as_lost_batch() {
        let processor = EchoProcessor {
            panic_at: Some(1),
            ..EchoProcessor::new()
        };
        let results: Vec<BatchResult> = dispatch(source(4), Arc::new(processor), settings(2))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ConvertError::WorkerLost { batch: 1 })));
    }
}
