//! Epoch loop with checkpointing, validation and NaN rollback.

use crate::checkpoint::{CheckpointStore, epoch_name};
use crate::dataset::{Dataset, Split};
use crate::metrics::{EpochReport, MetricsSink, StepMetrics};
use crate::model::{Model, Strategy};
use crate::nn::{Optimizer, RecurrentState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainOptions {
    pub num_epoch: usize,
    /// Save `<name>_e<epoch>` after every epoch. Required for NaN rollback.
    pub save_on_epoch: bool,
    /// Sweep the validation split after every epoch.
    pub valid_on_epoch: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            num_epoch: 10,
            save_on_epoch: true,
            valid_on_epoch: true,
        }
    }
}

/// Drives a [`Model`] through training and evaluation passes.
///
/// Each training step runs forward, loss, backward and the parameter
/// update, then resets the recurrent state, so no memory crosses batches.
pub struct Trainer<'a> {
    model: &'a mut Model,
    optimizer: Optimizer,
    store: &'a dyn CheckpointStore,
    sink: &'a dyn MetricsSink,
    state: RecurrentState,
}

impl<'a> Trainer<'a> {
    pub fn new(
        model: &'a mut Model,
        store: &'a dyn CheckpointStore,
        sink: &'a dyn MetricsSink,
    ) -> crate::Result<Self> {
        let hp = model.hparams();
        let optimizer = Optimizer::new(
            hp.optimizer,
            model.registry().all_vars(),
            hp.learning_rate,
            hp.weight_decay,
        )?;
        Ok(Self {
            model,
            optimizer,
            store,
            sink,
            state: RecurrentState::new(),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// One forward/backward/update step on a batch.
    pub fn train_step(&mut self, batch: &crate::dataset::Batch) -> crate::Result<StepMetrics> {
        self.state.reset();
        let scored = self
            .model
            .score(batch, Strategy::Train, &mut self.state, true)?;
        let metrics = scored.metrics()?;
        let vars = self.model.registry().all_vars();
        let clip = self.model.hparams().grad_clip;
        self.optimizer.backward_step(&scored.loss, &vars, clip)?;
        self.state.reset();
        Ok(metrics)
    }

    /// One shuffled pass over the training split.
    pub fn train_epoch(&mut self, dataset: &dyn Dataset) -> crate::Result<EpochReport> {
        let hp = self.model.hparams();
        let epoch = dataset.epoch(Split::Train, hp.batch_size, hp.max_n_signal, true);
        if epoch.n_batches() == 0 {
            return Err(crate::Error::Dataset(format!(
                "train split has no full batch of {} x {} tracks",
                hp.batch_size, hp.max_n_signal
            )));
        }
        let mut report = EpochReport::new();
        for (step, batch) in epoch.enumerate() {
            let metrics = self.train_step(&batch?)?;
            self.sink.record(Split::Train, step, metrics);
            report.add(metrics);
        }
        Ok(report)
    }

    /// Score every batch of `split` with the inference estimator, without
    /// updating parameters or applying dropout.
    pub fn evaluate(&mut self, dataset: &dyn Dataset, split: Split) -> crate::Result<EpochReport> {
        let hp = self.model.hparams();
        let mut report = EpochReport::new();
        for (step, batch) in dataset
            .epoch(split, hp.batch_size, hp.max_n_signal, false)
            .enumerate()
        {
            self.state.reset();
            let scored = self
                .model
                .score(&batch?, Strategy::Infer, &mut self.state, false)?;
            let metrics = scored.metrics()?;
            self.sink.record(split, step, metrics);
            report.add(metrics);
        }
        self.state.reset();
        if report.steps() == 0 {
            log::warn!("{split} split has no full batch, nothing scored");
        }
        Ok(report)
    }

    /// Run `options.num_epoch` epochs and return the report of each.
    ///
    /// When an epoch reports a NaN or infinite loss or SNR, the parameters
    /// saved after the previous epoch are restored and the epoch runs again.
    /// A non-finite first epoch, with per-epoch saving disabled, or more than
    /// `max_nan_retries` times in a row aborts with
    /// `Error::NonFiniteMetrics`.
    pub fn train(
        &mut self,
        dataset: &dyn Dataset,
        options: &TrainOptions,
    ) -> crate::Result<Vec<EpochReport>> {
        let mut reports = Vec::with_capacity(options.num_epoch);
        let mut retries = 0;
        let mut epoch = 0;
        while epoch < options.num_epoch {
            let report = self.train_epoch(dataset)?;
            if report.has_non_finite() {
                self.rollback(epoch, retries, options)?;
                retries += 1;
                continue;
            }
            retries = 0;
            if options.save_on_epoch {
                self.store.save(
                    self.model.registry(),
                    &epoch_name(self.model.name(), epoch + 1),
                )?;
            }
            log::info!("epoch {}/{} {report}", epoch + 1, options.num_epoch);

            if options.valid_on_epoch {
                let valid = self.evaluate(dataset, Split::Valid)?;
                log::info!("valid {}/{} {valid}", epoch + 1, options.num_epoch);
            }

            let decay = self.model.hparams().lr_decay;
            if decay != 1.0 {
                let lr = self.optimizer.learning_rate() * decay;
                self.optimizer.set_learning_rate(lr);
                log::debug!("learning rate now {lr:e}");
            }
            reports.push(report);
            epoch += 1;
        }
        Ok(reports)
    }

    /// Restore the checkpoint saved before `epoch` (0-based) and start a
    /// fresh optimizer over the restored parameters.
    fn rollback(&mut self, epoch: usize, retries: usize, options: &TrainOptions) -> crate::Result<()> {
        let fail = |reason: &str| crate::Error::NonFiniteMetrics {
            epoch: epoch + 1,
            reason: reason.to_string(),
        };
        if epoch == 0 {
            return Err(fail("NaN during the first epoch, no checkpoint to restore"));
        }
        if !options.save_on_epoch {
            return Err(fail("per-epoch saving is disabled, no checkpoint to restore"));
        }
        if retries >= self.model.hparams().max_nan_retries {
            return Err(fail("NaN persisted after restoring the last checkpoint"));
        }

        let name = epoch_name(self.model.name(), epoch);
        log::warn!(
            "epoch {}/{} got NaN values, restoring {name}",
            epoch + 1,
            options.num_epoch
        );
        self.store.load(self.model.registry_mut(), &name)?;

        let hp = self.model.hparams();
        self.optimizer = Optimizer::new(
            hp.optimizer,
            self.model.registry().all_vars(),
            self.optimizer.learning_rate(),
            hp.weight_decay,
        )?;
        self.state.reset();
        Ok(())
    }
}
