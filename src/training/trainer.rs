//! Training and evaluation loops for the translation model
//!
//! Alternates discriminator and generator updates with the update rules
//! resolved from the configured objective, and drives sampling, checkpointing
//! and learning rate decay on their configured schedules.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, Device, Kind, Tensor};
use tracing::info;

use crate::data::{DataLoader, Dataset, DatasetKind};
use crate::model::{DiscriminatorConfig, DiscriminatorOutput, GeneratorConfig, StarGan};
use crate::utils::{
    denorm, save_translation_grid, CheckpointStore, Config, EventLogger, ScalarWriter,
};

use super::labels::{create_labels, label2onehot};
use super::losses::{
    bce_fake_loss, bce_real_loss, classification_loss, gradient_penalty, reconstruction_loss,
};
use super::metrics::LossRecord;
use super::objective::{DCriterion, DiscriminatorUpdate, GeneratorUpdate, LossMode, Objective};
use super::swd::{max_sliced_wasserstein_distance, sliced_wasserstein_distance};

/// One prepared training batch with original and permuted target domains.
struct Batch {
    x_real: Tensor,
    /// Raw labels of the source domain, as the classifier expects them
    label_org: Tensor,
    /// Raw labels of the target domain
    label_trg: Tensor,
    /// Source domain vector fed to the generator for reconstruction
    c_org: Tensor,
    /// Target domain vector fed to the generator for translation
    c_trg: Tensor,
    /// Which dataset the classification labels belong to
    cls_dataset: DatasetKind,
    /// Column range of this batch's logits in the classifier output, when
    /// the classifier covers more than one dataset
    cls_range: Option<(i64, i64)>,
}

impl Batch {
    fn cls_logits(&self, cls: &Tensor) -> Tensor {
        match self.cls_range {
            Some((start, len)) => cls.narrow(1, start, len),
            None => cls.shallow_clone(),
        }
    }
}

/// Mutable loop state: the iteration cursor and the decaying learning rates.
struct TrainSession {
    iteration: i64,
    g_lr: f64,
    d_lr: f64,
}

impl TrainSession {
    fn new(start_iteration: i64, g_lr: f64, d_lr: f64) -> Self {
        Self {
            iteration: start_iteration,
            g_lr,
            d_lr,
        }
    }
}

/// StarGAN trainer
pub struct Trainer {
    config: Config,
    dataset: DatasetKind,
    objective: Objective,
    device: Device,
    checkpoints: CheckpointStore,
    scalars: ScalarWriter,
    events: EventLogger,
}

impl Trainer {
    /// Create a trainer from a validated configuration.
    ///
    /// Resolves the dataset and the objective's update pair once, and opens
    /// the checkpoint store and log sinks under the configured directories.
    pub fn new(config: Config) -> Result<Self> {
        let dataset = DatasetKind::parse(&config.training.dataset)?;
        let mode = LossMode::from_flags(
            config.objective.use_sw_loss,
            config.objective.use_max_sw_loss,
        )?;
        let criterion = DCriterion::parse(&config.objective.d_criterion)?;
        let objective = Objective::resolve(mode, criterion);
        let device = config.get_device();

        let checkpoints = CheckpointStore::new(Path::new(&config.output.model_save_dir))?;
        let scalars = ScalarWriter::new(&Path::new(&config.output.log_dir).join("scalars.csv"))?;
        let events = EventLogger::new(&Path::new(&config.output.log_dir).join("progress.log"))?;

        Ok(Self {
            config,
            dataset,
            objective,
            device,
            checkpoints,
            scalars,
            events,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the generator and discriminator for the configured dataset.
    ///
    /// On the combined dataset the generator consumes both label blocks plus
    /// a two-slot dataset mask, and the classifier covers both label blocks.
    fn build_model(&self) -> StarGan {
        let gen_config = GeneratorConfig {
            c_dim: self.generator_label_dim(),
            conv_dim: self.config.model.g_conv_dim,
            repeat_num: self.config.model.g_repeat_num,
        };
        let disc_config = DiscriminatorConfig {
            image_size: self.config.model.image_size,
            c_dim: self.classifier_label_dim(),
            conv_dim: self.config.model.d_conv_dim,
            repeat_num: self.config.model.d_repeat_num,
            include_feature: self
                .objective
                .requires_feature(self.config.objective.use_d_feature),
        };
        StarGan::new(gen_config, disc_config, self.device)
    }

    fn generator_label_dim(&self) -> i64 {
        match self.dataset {
            DatasetKind::Both => self.config.model.c_dim + self.config.model.c2_dim + 2,
            _ => self.config.model.c_dim,
        }
    }

    fn classifier_label_dim(&self) -> i64 {
        match self.dataset {
            DatasetKind::Both => self.config.model.c_dim + self.config.model.c2_dim,
            _ => self.config.model.c_dim,
        }
    }

    /// Pair a loaded batch with a randomly permuted target domain.
    fn prepare_batch(&self, x_real: Tensor, label_org: Tensor) -> Batch {
        let batch_size = label_org.size()[0];
        let rand_idx = Tensor::randperm(batch_size, (Kind::Int64, label_org.device()));
        let label_trg = label_org.index_select(0, &rand_idx);

        let (c_org, c_trg) = if self.dataset.is_multi_label() {
            (label_org.copy(), label_trg.copy())
        } else {
            (
                label2onehot(&label_org, self.config.model.c_dim),
                label2onehot(&label_trg, self.config.model.c_dim),
            )
        };

        Batch {
            x_real: x_real.to_device(self.device),
            label_org: label_org.to_device(self.device),
            label_trg: label_trg.to_device(self.device),
            c_org: c_org.to_device(self.device),
            c_trg: c_trg.to_device(self.device),
            cls_dataset: self.dataset,
            cls_range: None,
        }
    }

    /// Prepare a batch from one of the two datasets of a combined run.
    ///
    /// Domain vectors are padded with zeros for the other dataset's block and
    /// a one-hot dataset mask, and the classification logits are restricted
    /// to this dataset's columns.
    fn prepare_multi_batch(&self, x_real: Tensor, label_org: Tensor, dataset: DatasetKind) -> Batch {
        let batch_size = label_org.size()[0];
        let rand_idx = Tensor::randperm(batch_size, (Kind::Int64, label_org.device()));
        let label_trg = label_org.index_select(0, &rand_idx);

        let c_dim = self.config.model.c_dim;
        let c2_dim = self.config.model.c2_dim;
        let options = (Kind::Float, label_org.device());

        let (c_org, c_trg, cls_range) = if dataset.is_multi_label() {
            let zero = Tensor::zeros([batch_size, c2_dim], options);
            let mask = label2onehot(&Tensor::zeros([batch_size], options), 2);
            (
                Tensor::cat(&[&label_org, &zero, &mask], 1),
                Tensor::cat(&[&label_trg, &zero, &mask], 1),
                Some((0, c_dim)),
            )
        } else {
            let c_org_onehot = label2onehot(&label_org, c2_dim);
            let c_trg_onehot = label2onehot(&label_trg, c2_dim);
            let zero = Tensor::zeros([batch_size, c_dim], options);
            let mask = label2onehot(&Tensor::ones([batch_size], options), 2);
            (
                Tensor::cat(&[&zero, &c_org_onehot, &mask], 1),
                Tensor::cat(&[&zero, &c_trg_onehot, &mask], 1),
                Some((c_dim, c2_dim)),
            )
        };

        Batch {
            x_real: x_real.to_device(self.device),
            label_org: label_org.to_device(self.device),
            label_trg: label_trg.to_device(self.device),
            c_org: c_org.to_device(self.device),
            c_trg: c_trg.to_device(self.device),
            cls_dataset: dataset,
            cls_range,
        }
    }

    fn update_discriminator(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        match self.objective.discriminator {
            DiscriminatorUpdate::WassersteinGp => {
                self.update_discriminator_wgan_gp(model, g_opt, d_opt, batch)
            }
            DiscriminatorUpdate::Bce => self.update_discriminator_bce(model, g_opt, d_opt, batch),
        }
    }

    /// Wasserstein critic update with gradient penalty on interpolated images.
    fn update_discriminator_wgan_gp(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        let lambda_cls = self.config.model.lambda_cls;
        let lambda_gp = self.config.model.lambda_gp;

        // Loss with real images.
        let out_real = model.discriminate(&batch.x_real);
        let d_loss_real = -out_real.src.mean(Kind::Float);
        let d_loss_cls = classification_loss(
            &batch.cls_logits(&out_real.cls),
            &batch.label_org,
            batch.cls_dataset,
        );

        // Loss with fake images.
        let x_fake = model.translate(&batch.x_real, &batch.c_trg).detach();
        let out_fake = model.discriminate(&x_fake);
        let d_loss_fake = out_fake.src.mean(Kind::Float);

        // Penalize the critic's gradient norm on random interpolates.
        let batch_size = batch.x_real.size()[0];
        let alpha = Tensor::rand([batch_size, 1, 1, 1], (Kind::Float, self.device));
        let x_hat =
            (&x_fake + &alpha * (&batch.x_real - &x_fake)).set_requires_grad(true);
        let out_hat = model.discriminate(&x_hat);
        let d_loss_gp = gradient_penalty(&out_hat.src, &x_hat)?;

        let d_loss =
            &d_loss_real + &d_loss_fake + &d_loss_cls * lambda_cls + &d_loss_gp * lambda_gp;
        reset_grad(g_opt, d_opt);
        d_loss.backward();
        d_opt.step();

        let mut record = LossRecord::new();
        record.insert("D/loss_real", d_loss_real.double_value(&[]));
        record.insert("D/loss_fake", d_loss_fake.double_value(&[]));
        record.insert("D/loss_cls", d_loss_cls.double_value(&[]));
        record.insert("D/loss_gp", d_loss_gp.double_value(&[]));
        Ok(record)
    }

    /// Binary cross entropy update, used by the sliced objectives.
    fn update_discriminator_bce(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        let lambda_cls = self.config.model.lambda_cls;

        let out_real = model.discriminate(&batch.x_real);
        let d_loss_real = bce_real_loss(&out_real.src);
        let d_loss_cls = classification_loss(
            &batch.cls_logits(&out_real.cls),
            &batch.label_org,
            batch.cls_dataset,
        );

        let x_fake = model.translate(&batch.x_real, &batch.c_trg).detach();
        let out_fake = model.discriminate(&x_fake);
        let d_loss_fake = bce_fake_loss(&out_fake.src);

        let d_loss = &d_loss_real + &d_loss_fake + &d_loss_cls * lambda_cls;
        reset_grad(g_opt, d_opt);
        d_loss.backward();
        d_opt.step();

        let mut record = LossRecord::new();
        record.insert("D/loss_real", d_loss_real.double_value(&[]));
        record.insert("D/loss_fake", d_loss_fake.double_value(&[]));
        record.insert("D/loss_cls", d_loss_cls.double_value(&[]));
        Ok(record)
    }

    fn update_generator(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        match self.objective.generator {
            GeneratorUpdate::Wasserstein => {
                self.update_generator_wasserstein(model, g_opt, d_opt, batch)
            }
            GeneratorUpdate::SlicedWasserstein => {
                self.update_generator_sliced(model, g_opt, d_opt, batch)
            }
            GeneratorUpdate::MaxSlicedWasserstein => {
                self.update_generator_max_sliced(model, g_opt, d_opt, batch)
            }
        }
    }

    /// Original generator update against the Wasserstein critic.
    fn update_generator_wasserstein(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        let x_fake = model.translate(&batch.x_real, &batch.c_trg);
        let out_fake = model.discriminate(&x_fake);
        let g_loss_fake = -out_fake.src.mean(Kind::Float);
        let g_loss_cls = classification_loss(
            &batch.cls_logits(&out_fake.cls),
            &batch.label_trg,
            batch.cls_dataset,
        );

        // Translate back to the original domain.
        let x_reconst = model.translate(&x_fake, &batch.c_org);
        let g_loss_rec = reconstruction_loss(&batch.x_real, &x_reconst);

        let g_loss = &g_loss_fake
            + &g_loss_rec * self.config.model.lambda_rec
            + &g_loss_cls * self.config.model.lambda_cls;
        reset_grad(g_opt, d_opt);
        g_loss.backward();
        g_opt.step();

        let mut record = LossRecord::new();
        record.insert("G/loss_fake", g_loss_fake.double_value(&[]));
        record.insert("G/loss_rec", g_loss_rec.double_value(&[]));
        record.insert("G/loss_cls", g_loss_cls.double_value(&[]));
        Ok(record)
    }

    /// Generator update that matches real and translated batches under the
    /// sliced Wasserstein distance, either over the discriminator's feature
    /// vectors or directly over flattened pixels.
    fn update_generator_sliced(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        let num_projections = self.config.objective.num_projections;

        let x_fake = model.translate(&batch.x_real, &batch.c_trg);
        let out_fake = model.discriminate(&x_fake);

        let g_loss_fake = if self.config.objective.use_d_feature {
            let out_real = model.discriminate(&batch.x_real);
            let h_real = expect_feature(&out_real)?;
            let h_fake = expect_feature(&out_fake)?;
            sliced_wasserstein_distance(h_real, h_fake, num_projections, self.device)?
        } else {
            let batch_size = batch.x_real.size()[0];
            sliced_wasserstein_distance(
                &batch.x_real.view([batch_size, -1]),
                &x_fake.view([batch_size, -1]),
                num_projections,
                self.device,
            )?
        };
        let g_loss_cls = classification_loss(
            &batch.cls_logits(&out_fake.cls),
            &batch.label_trg,
            batch.cls_dataset,
        );

        let x_reconst = model.translate(&x_fake, &batch.c_org);
        let g_loss_rec = reconstruction_loss(&batch.x_real, &x_reconst);

        let g_loss = &g_loss_fake
            + &g_loss_rec * self.config.model.lambda_rec
            + &g_loss_cls * self.config.model.lambda_cls;
        reset_grad(g_opt, d_opt);
        g_loss.backward();
        g_opt.step();

        let mut record = LossRecord::new();
        record.insert("G/loss_fake", g_loss_fake.double_value(&[]));
        record.insert("G/loss_rec", g_loss_rec.double_value(&[]));
        record.insert("G/loss_cls", g_loss_cls.double_value(&[]));
        Ok(record)
    }

    /// Generator update under the max-sliced Wasserstein distance.
    ///
    /// The discriminator itself is the learned projection: real and
    /// translated batches are compared after sorting either its scalar score
    /// columns or its feature vectors, per `sort_scalar`.
    fn update_generator_max_sliced(
        &self,
        model: &StarGan,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
        batch: &Batch,
    ) -> Result<LossRecord> {
        let x_fake = model.translate(&batch.x_real, &batch.c_trg);
        let out_fake = model.discriminate(&x_fake);
        let out_real = model.discriminate(&batch.x_real);

        let (q_real, q_fake) = if self.config.objective.sort_scalar {
            let batch_size = batch.x_real.size()[0];
            (
                out_real.src.view([batch_size, -1]),
                out_fake.src.view([batch_size, -1]),
            )
        } else {
            (
                expect_feature(&out_real)?.shallow_clone(),
                expect_feature(&out_fake)?.shallow_clone(),
            )
        };
        let g_loss_fake = max_sliced_wasserstein_distance(&q_real, &q_fake)?.mean(Kind::Float);
        let g_loss_cls = classification_loss(
            &batch.cls_logits(&out_fake.cls),
            &batch.label_trg,
            batch.cls_dataset,
        );

        let x_reconst = model.translate(&x_fake, &batch.c_org);
        let g_loss_rec = reconstruction_loss(&batch.x_real, &x_reconst);

        let g_loss = &g_loss_fake
            + &g_loss_rec * self.config.model.lambda_rec
            + &g_loss_cls * self.config.model.lambda_cls;
        reset_grad(g_opt, d_opt);
        g_loss.backward();
        g_opt.step();

        let mut record = LossRecord::new();
        record.insert("G/loss_fake", g_loss_fake.double_value(&[]));
        record.insert("G/loss_rec", g_loss_rec.double_value(&[]));
        record.insert("G/loss_cls", g_loss_cls.double_value(&[]));
        Ok(record)
    }

    /// Train on a single dataset.
    ///
    /// # Arguments
    ///
    /// * `loader` - DataLoader providing image and label batches
    pub fn train<D: Dataset>(&mut self, loader: &mut DataLoader<D>) -> Result<()> {
        let mut model = self.build_model();
        let (g_params, d_params) = model.num_parameters();
        info!(
            "Generator parameters: {}, discriminator parameters: {}",
            g_params, d_params
        );

        let mut g_opt = model.gen_optimizer(
            self.config.training.g_lr,
            self.config.training.beta1,
            self.config.training.beta2,
        );
        let mut d_opt = model.disc_optimizer(
            self.config.training.d_lr,
            self.config.training.beta1,
            self.config.training.beta2,
        );

        std::fs::create_dir_all(&self.config.output.sample_dir).ok();

        // Fixed inputs for the periodic sampling snapshot.
        let (x_fixed, label_fixed) = next_cyclic(loader)?;
        let x_fixed = x_fixed.to_device(self.device);
        let c_fixed_list: Vec<Tensor> = create_labels(
            &label_fixed,
            self.config.model.c_dim,
            self.dataset,
            &self.config.training.selected_attrs,
        )?
        .into_iter()
        .map(|c| c.to_device(self.device))
        .collect();

        let start_iters = match self.config.training.resume_iters {
            Some(step) => {
                self.checkpoints.restore(&mut model, step)?;
                step
            }
            None => 0,
        };

        let num_iters = self.config.training.num_iters;
        let n_critic = self.config.training.n_critic;
        let log_step = self.config.steps.log_step;
        let sample_step = self.config.steps.sample_step;
        let model_save_step = self.config.steps.model_save_step;
        let mut session = TrainSession::new(
            start_iters,
            self.config.training.g_lr,
            self.config.training.d_lr,
        );

        info!(
            "Starting training for {} iterations on {} ({} objective)",
            num_iters, self.dataset, self.objective.mode
        );

        let pb = ProgressBar::new(num_iters as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        pb.set_position(start_iters as u64);

        let start_time = Instant::now();
        while session.iteration < num_iters {
            let i = session.iteration;
            let (x_real, label_org) = next_cyclic(loader)?;
            let batch = self.prepare_batch(x_real, label_org);

            let mut losses = self.update_discriminator(&model, &mut g_opt, &mut d_opt, &batch)?;
            if should_update_generator(i, n_critic) {
                losses.merge(self.update_generator(&model, &mut g_opt, &mut d_opt, &batch)?);
            }

            match losses.get("G/loss_fake") {
                Some(g) => pb.set_message(format!(
                    "D: {:.4}, G: {:.4}",
                    losses.get("D/loss_real").unwrap_or(0.0),
                    g
                )),
                None => pb.set_message(format!(
                    "D: {:.4}",
                    losses.get("D/loss_real").unwrap_or(0.0)
                )),
            }

            if (i + 1) % log_step == 0 {
                self.log_training_info(start_time.elapsed(), i, None, &losses)?;
            }

            if (i + 1) % sample_step == 0 {
                self.save_samples(&model, i, &x_fixed, &c_fixed_list)?;
            }

            if (i + 1) % model_save_step == 0 || (i + 1) == num_iters {
                self.save_checkpoints(&model, i)?;
            }

            self.decay_learning_rates(&mut session, &mut g_opt, &mut d_opt)?;

            pb.inc(1);
            session.iteration += 1;
        }
        pb.finish_with_message("done");

        Ok(())
    }

    /// Train on CelebA and RaFD jointly with the dataset mask mechanism.
    ///
    /// Each outer iteration performs one update per dataset; the classifier
    /// columns of the inactive dataset carry no loss.
    pub fn train_multi<C: Dataset, R: Dataset>(
        &mut self,
        celeba_loader: &mut DataLoader<C>,
        rafd_loader: &mut DataLoader<R>,
    ) -> Result<()> {
        let mut model = self.build_model();
        let (g_params, d_params) = model.num_parameters();
        info!(
            "Generator parameters: {}, discriminator parameters: {}",
            g_params, d_params
        );

        let mut g_opt = model.gen_optimizer(
            self.config.training.g_lr,
            self.config.training.beta1,
            self.config.training.beta2,
        );
        let mut d_opt = model.disc_optimizer(
            self.config.training.d_lr,
            self.config.training.beta1,
            self.config.training.beta2,
        );

        std::fs::create_dir_all(&self.config.output.sample_dir).ok();

        // Fixed inputs come from the attribute dataset; the snapshot sweeps
        // the target domains of both datasets.
        let (x_fixed, label_fixed) = next_cyclic(celeba_loader)?;
        let x_fixed = x_fixed.to_device(self.device);
        let c_celeba_list: Vec<Tensor> = create_labels(
            &label_fixed,
            self.config.model.c_dim,
            DatasetKind::CelebA,
            &self.config.training.selected_attrs,
        )?
        .into_iter()
        .map(|c| c.to_device(self.device))
        .collect();
        let c_rafd_list: Vec<Tensor> = create_labels(
            &label_fixed,
            self.config.model.c2_dim,
            DatasetKind::RaFD,
            &[],
        )?
        .into_iter()
        .map(|c| c.to_device(self.device))
        .collect();

        let start_iters = match self.config.training.resume_iters {
            Some(step) => {
                self.checkpoints.restore(&mut model, step)?;
                step
            }
            None => 0,
        };

        let num_iters = self.config.training.num_iters;
        let n_critic = self.config.training.n_critic;
        let log_step = self.config.steps.log_step;
        let sample_step = self.config.steps.sample_step;
        let model_save_step = self.config.steps.model_save_step;
        let mut session = TrainSession::new(
            start_iters,
            self.config.training.g_lr,
            self.config.training.d_lr,
        );

        info!(
            "Starting training for {} iterations on both datasets ({} objective)",
            num_iters, self.objective.mode
        );

        let pb = ProgressBar::new(num_iters as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        pb.set_position(start_iters as u64);

        let start_time = Instant::now();
        while session.iteration < num_iters {
            let i = session.iteration;
            for dataset in [DatasetKind::CelebA, DatasetKind::RaFD] {
                let (x_real, label_org) = match dataset {
                    DatasetKind::CelebA => next_cyclic(celeba_loader)?,
                    _ => next_cyclic(rafd_loader)?,
                };
                let batch = self.prepare_multi_batch(x_real, label_org, dataset);

                let mut losses =
                    self.update_discriminator(&model, &mut g_opt, &mut d_opt, &batch)?;
                if should_update_generator(i, n_critic) {
                    losses.merge(self.update_generator(&model, &mut g_opt, &mut d_opt, &batch)?);
                }

                if (i + 1) % log_step == 0 {
                    self.log_training_info(start_time.elapsed(), i, Some(dataset), &losses)?;
                }
            }

            if (i + 1) % sample_step == 0 {
                self.save_samples_multi(&model, i, &x_fixed, &c_celeba_list, &c_rafd_list)?;
            }

            if (i + 1) % model_save_step == 0 || (i + 1) == num_iters {
                self.save_checkpoints(&model, i)?;
            }

            self.decay_learning_rates(&mut session, &mut g_opt, &mut d_opt)?;

            pb.inc(1);
            session.iteration += 1;
        }
        pb.finish_with_message("done");

        Ok(())
    }

    /// Translate every test batch across all target domains and save the
    /// resulting image grids.
    pub fn test<D: Dataset>(&self, loader: &mut DataLoader<D>) -> Result<()> {
        let mut model = self.build_model();
        self.checkpoints
            .restore(&mut model, self.config.training.test_iters)?;

        std::fs::create_dir_all(&self.config.output.result_dir).ok();

        let mut batch_index = 0i64;
        while let Some((x_real, c_org)) = loader.next_batch()? {
            batch_index += 1;
            let x_real = x_real.to_device(self.device);
            let c_trg_list: Vec<Tensor> = create_labels(
                &c_org,
                self.config.model.c_dim,
                self.dataset,
                &self.config.training.selected_attrs,
            )?
            .into_iter()
            .map(|c| c.to_device(self.device))
            .collect();

            let mut columns = vec![x_real.shallow_clone()];
            tch::no_grad(|| {
                for c_trg in &c_trg_list {
                    columns.push(model.translate(&x_real, c_trg));
                }
            });
            let x_concat = Tensor::cat(&columns, 3);

            let path = Path::new(&self.config.output.result_dir)
                .join(format!("{}-images.jpg", batch_index));
            save_translation_grid(&path, &denorm(&x_concat))?;
            info!("Saved real and fake images into {}...", path.display());
        }

        Ok(())
    }

    /// Evaluate a combined-dataset model, sweeping the target domains of
    /// both datasets for every test batch.
    pub fn test_multi<D: Dataset>(&self, celeba_loader: &mut DataLoader<D>) -> Result<()> {
        let mut model = self.build_model();
        self.checkpoints
            .restore(&mut model, self.config.training.test_iters)?;

        std::fs::create_dir_all(&self.config.output.result_dir).ok();

        let c_dim = self.config.model.c_dim;
        let c2_dim = self.config.model.c2_dim;
        let mut batch_index = 0i64;
        while let Some((x_real, c_org)) = celeba_loader.next_batch()? {
            batch_index += 1;
            let x_real = x_real.to_device(self.device);
            let batch_size = x_real.size()[0];

            let c_celeba_list = create_labels(
                &c_org,
                c_dim,
                DatasetKind::CelebA,
                &self.config.training.selected_attrs,
            )?;
            let c_rafd_list = create_labels(&c_org, c2_dim, DatasetKind::RaFD, &[])?;

            let options = (Kind::Float, self.device);
            let zero_celeba = Tensor::zeros([batch_size, c_dim], options);
            let zero_rafd = Tensor::zeros([batch_size, c2_dim], options);
            let mask_celeba = label2onehot(&Tensor::zeros([batch_size], options), 2);
            let mask_rafd = label2onehot(&Tensor::ones([batch_size], options), 2);

            let mut columns = vec![x_real.shallow_clone()];
            tch::no_grad(|| {
                for c_fixed in &c_celeba_list {
                    let c_trg = Tensor::cat(
                        &[&c_fixed.to_device(self.device), &zero_rafd, &mask_celeba],
                        1,
                    );
                    columns.push(model.translate(&x_real, &c_trg));
                }
                for c_fixed in &c_rafd_list {
                    let c_trg = Tensor::cat(
                        &[&zero_celeba, &c_fixed.to_device(self.device), &mask_rafd],
                        1,
                    );
                    columns.push(model.translate(&x_real, &c_trg));
                }
            });
            let x_concat = Tensor::cat(&columns, 3);

            let path = Path::new(&self.config.output.result_dir)
                .join(format!("{}-images.jpg", batch_index));
            save_translation_grid(&path, &denorm(&x_concat))?;
            info!("Saved real and fake images into {}...", path.display());
        }

        Ok(())
    }

    fn log_training_info(
        &mut self,
        elapsed: Duration,
        iteration: i64,
        dataset: Option<DatasetKind>,
        losses: &LossRecord,
    ) -> Result<()> {
        let mut line = format!(
            "Elapsed [{}], Iteration [{}/{}]",
            format_elapsed(elapsed),
            iteration + 1,
            self.config.training.num_iters
        );
        if let Some(dataset) = dataset {
            line.push_str(&format!(", Dataset [{}]", dataset));
        }
        line.push_str(&format!(", {}", losses));
        self.events.log(&line)?;

        for (tag, value) in losses.iter() {
            self.scalars.write(iteration + 1, tag, value)?;
        }
        Ok(())
    }

    /// Translate the fixed batch into every target domain and save the grid.
    fn save_samples(
        &mut self,
        model: &StarGan,
        iteration: i64,
        x_fixed: &Tensor,
        c_fixed_list: &[Tensor],
    ) -> Result<()> {
        let rows = x_fixed.size()[0].min(16);
        let x = x_fixed.narrow(0, 0, rows);

        let mut columns = vec![x.shallow_clone()];
        tch::no_grad(|| {
            for c_fixed in c_fixed_list {
                columns.push(model.translate(&x, &c_fixed.narrow(0, 0, rows)));
            }
        });
        let x_concat = Tensor::cat(&columns, 3);

        let path = Path::new(&self.config.output.sample_dir)
            .join(format!("{}-images.jpg", iteration + 1));
        save_translation_grid(&path, &denorm(&x_concat))?;
        self.events
            .log(&format!("Saved real and fake images into {}...", path.display()))?;
        Ok(())
    }

    fn save_samples_multi(
        &mut self,
        model: &StarGan,
        iteration: i64,
        x_fixed: &Tensor,
        c_celeba_list: &[Tensor],
        c_rafd_list: &[Tensor],
    ) -> Result<()> {
        let rows = x_fixed.size()[0].min(16);
        let x = x_fixed.narrow(0, 0, rows);

        let c_dim = self.config.model.c_dim;
        let c2_dim = self.config.model.c2_dim;
        let options = (Kind::Float, self.device);
        let zero_celeba = Tensor::zeros([rows, c_dim], options);
        let zero_rafd = Tensor::zeros([rows, c2_dim], options);
        let mask_celeba = label2onehot(&Tensor::zeros([rows], options), 2);
        let mask_rafd = label2onehot(&Tensor::ones([rows], options), 2);

        let mut columns = vec![x.shallow_clone()];
        tch::no_grad(|| {
            for c_fixed in c_celeba_list {
                let c_trg =
                    Tensor::cat(&[&c_fixed.narrow(0, 0, rows), &zero_rafd, &mask_celeba], 1);
                columns.push(model.translate(&x, &c_trg));
            }
            for c_fixed in c_rafd_list {
                let c_trg =
                    Tensor::cat(&[&zero_celeba, &c_fixed.narrow(0, 0, rows), &mask_rafd], 1);
                columns.push(model.translate(&x, &c_trg));
            }
        });
        let x_concat = Tensor::cat(&columns, 3);

        let path = Path::new(&self.config.output.sample_dir)
            .join(format!("{}-images.jpg", iteration + 1));
        save_translation_grid(&path, &denorm(&x_concat))?;
        self.events
            .log(&format!("Saved real and fake images into {}...", path.display()))?;
        Ok(())
    }

    fn save_checkpoints(&mut self, model: &StarGan, iteration: i64) -> Result<()> {
        self.checkpoints.save(model, iteration + 1)?;
        self.events.log(&format!(
            "Saved model checkpoints into {}...",
            self.checkpoints.dir().display()
        ))?;
        Ok(())
    }

    /// Linearly decay both learning rates once the session enters the final
    /// `num_iters_decay` iterations, at the `lr_update_step` cadence.
    fn decay_learning_rates(
        &mut self,
        session: &mut TrainSession,
        g_opt: &mut nn::Optimizer,
        d_opt: &mut nn::Optimizer,
    ) -> Result<()> {
        let num_iters = self.config.training.num_iters;
        let num_iters_decay = self.config.training.num_iters_decay;
        let step = session.iteration + 1;
        if step % self.config.steps.lr_update_step == 0 && step > num_iters - num_iters_decay {
            session.g_lr -= self.config.training.g_lr / num_iters_decay as f64;
            session.d_lr -= self.config.training.d_lr / num_iters_decay as f64;
            g_opt.set_lr(session.g_lr);
            d_opt.set_lr(session.d_lr);
            self.events.log(&format!(
                "Decayed learning rates, g_lr: {}, d_lr: {}.",
                session.g_lr, session.d_lr
            ))?;
        }
        Ok(())
    }
}

/// Zero the gradients of both optimizers before a backward pass.
fn reset_grad(g_opt: &mut nn::Optimizer, d_opt: &mut nn::Optimizer) {
    g_opt.zero_grad();
    d_opt.zero_grad();
}

/// The generator trains once per `n_critic` discriminator updates.
fn should_update_generator(iteration: i64, n_critic: i64) -> bool {
    (iteration + 1) % n_critic == 0
}

/// Fetch the next batch, restarting the loader when it is exhausted.
fn next_cyclic<D: Dataset>(loader: &mut DataLoader<D>) -> Result<(Tensor, Tensor)> {
    if let Some(batch) = loader.next_batch()? {
        return Ok(batch);
    }
    loader.reset();
    loader
        .next_batch()?
        .context("data loader yielded no batches")
}

fn expect_feature(out: &DiscriminatorOutput) -> Result<&Tensor> {
    out.feature
        .as_ref()
        .context("discriminator was built without the feature output this objective requires")
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let base = dir.path();
        let mut config = Config::default();
        config.model.c_dim = 3;
        config.model.c2_dim = 4;
        config.model.image_size = 16;
        config.model.g_conv_dim = 4;
        config.model.d_conv_dim = 4;
        config.model.g_repeat_num = 1;
        config.model.d_repeat_num = 2;
        config.training.dataset = "CelebA".to_string();
        config.training.batch_size = 2;
        config.training.selected_attrs = vec![
            "Black_Hair".to_string(),
            "Blond_Hair".to_string(),
            "Male".to_string(),
        ];
        config.device = "cpu".to_string();
        config.output.log_dir = base.join("logs").to_string_lossy().into_owned();
        config.output.model_save_dir = base.join("models").to_string_lossy().into_owned();
        config.output.sample_dir = base.join("samples").to_string_lossy().into_owned();
        config.output.result_dir = base.join("results").to_string_lossy().into_owned();
        config
    }

    fn random_batch(trainer: &Trainer) -> Batch {
        let x_real = Tensor::rand([2, 3, 16, 16], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let labels = Tensor::from_slice(&[1f32, 0.0, 0.0, 0.0, 1.0, 1.0]).view([2, 3]);
        trainer.prepare_batch(x_real, labels)
    }

    #[test]
    fn test_generator_updates_once_per_critic_window() {
        let updates: Vec<i64> = (0..20).filter(|&i| should_update_generator(i, 5)).collect();
        assert_eq!(updates, vec![4, 9, 14, 19]);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(3661)), "1:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "0:00:59");
    }

    #[test]
    fn test_conflicting_loss_flags_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.objective.use_sw_loss = true;
        config.objective.use_max_sw_loss = true;

        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_prepare_batch_permutes_target_labels() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(&dir)).unwrap();
        let batch = random_batch(&trainer);

        assert_eq!(batch.label_trg.size(), vec![2, 3]);
        // The permutation reorders rows but preserves the label mass.
        let org_sum = batch.label_org.sum(Kind::Float).double_value(&[]);
        let trg_sum = batch.label_trg.sum(Kind::Float).double_value(&[]);
        assert!((org_sum - trg_sum).abs() < 1e-6);
        // Attribute datasets feed the labels to the generator unchanged.
        let diff = (&batch.c_org - &batch.label_org)
            .abs()
            .sum(Kind::Float)
            .double_value(&[]);
        assert!(diff < 1e-6);
        assert!(batch.cls_range.is_none());
    }

    #[test]
    fn test_prepare_multi_batch_pads_and_masks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.training.dataset = "Both".to_string();
        let trainer = Trainer::new(config).unwrap();

        let x_real = Tensor::rand([2, 3, 16, 16], (Kind::Float, Device::Cpu));
        let labels = Tensor::from_slice(&[0i64, 2]);
        let batch = trainer.prepare_multi_batch(x_real, labels, DatasetKind::RaFD);

        // Layout is [celeba block | rafd block | dataset mask].
        assert_eq!(batch.c_org.size(), vec![2, 3 + 4 + 2]);
        let celeba_block = batch.c_org.narrow(1, 0, 3).abs().sum(Kind::Float);
        assert!(celeba_block.double_value(&[]) < 1e-6);
        let rafd_rows = batch.c_org.narrow(1, 3, 4).sum_dim_intlist(
            [1].as_slice(),
            false,
            Kind::Float,
        );
        assert_eq!(Vec::<f64>::try_from(&rafd_rows).unwrap(), vec![1.0, 1.0]);
        let mask = batch.c_org.narrow(1, 7, 2);
        assert_eq!(
            Vec::<f64>::try_from(&mask.reshape([-1])).unwrap(),
            vec![0.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(batch.cls_range, Some((3, 4)));
    }

    #[test]
    fn test_wgan_gp_discriminator_update_records_all_terms() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(&dir)).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(1e-4, 0.5, 0.999);
        let batch = random_batch(&trainer);

        let record = trainer
            .update_discriminator(&model, &mut g_opt, &mut d_opt, &batch)
            .unwrap();

        for tag in ["D/loss_real", "D/loss_fake", "D/loss_cls", "D/loss_gp"] {
            let value = record.get(tag).unwrap();
            assert!(value.is_finite(), "{} = {}", tag, value);
        }
    }

    #[test]
    fn test_bce_discriminator_update_has_no_penalty_term() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.objective.use_sw_loss = true;
        config.objective.d_criterion = "BCE".to_string();
        let trainer = Trainer::new(config).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(1e-4, 0.5, 0.999);
        let batch = random_batch(&trainer);

        let record = trainer
            .update_discriminator(&model, &mut g_opt, &mut d_opt, &batch)
            .unwrap();

        assert!(record.get("D/loss_gp").is_none());
        assert!(record.get("D/loss_real").unwrap() > 0.0);
        assert!(record.get("D/loss_fake").unwrap() > 0.0);
    }

    #[test]
    fn test_wasserstein_generator_update_records_all_terms() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Trainer::new(test_config(&dir)).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(1e-4, 0.5, 0.999);
        let batch = random_batch(&trainer);

        let record = trainer
            .update_generator(&model, &mut g_opt, &mut d_opt, &batch)
            .unwrap();

        for tag in ["G/loss_fake", "G/loss_rec", "G/loss_cls"] {
            let value = record.get(tag).unwrap();
            assert!(value.is_finite(), "{} = {}", tag, value);
        }
    }

    #[test]
    fn test_sliced_generator_update_on_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.objective.use_sw_loss = true;
        config.objective.num_projections = 8;
        let trainer = Trainer::new(config).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(1e-4, 0.5, 0.999);
        let batch = random_batch(&trainer);

        let record = trainer
            .update_generator(&model, &mut g_opt, &mut d_opt, &batch)
            .unwrap();

        // The sliced distance is a mean of squares.
        assert!(record.get("G/loss_fake").unwrap() >= 0.0);
        assert!(record.get("G/loss_rec").unwrap().is_finite());
    }

    #[test]
    fn test_max_sliced_generator_update_uses_discriminator_scores() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.objective.use_max_sw_loss = true;
        let trainer = Trainer::new(config).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(1e-4, 0.5, 0.999);
        let batch = random_batch(&trainer);

        // Max-sliced runs always build the feature output.
        assert!(model.discriminate(&batch.x_real).feature.is_some());

        let record = trainer
            .update_generator(&model, &mut g_opt, &mut d_opt, &batch)
            .unwrap();
        assert!(record.get("G/loss_fake").unwrap() >= 0.0);
    }

    #[test]
    fn test_learning_rate_decay_only_inside_final_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.training.num_iters = 20;
        config.training.num_iters_decay = 10;
        config.training.g_lr = 1e-4;
        config.training.d_lr = 2e-4;
        config.steps.lr_update_step = 5;
        let mut trainer = Trainer::new(config).unwrap();
        let model = trainer.build_model();
        let mut g_opt = model.gen_optimizer(1e-4, 0.5, 0.999);
        let mut d_opt = model.disc_optimizer(2e-4, 0.5, 0.999);
        let mut session = TrainSession::new(0, 1e-4, 2e-4);

        // Iteration 4 sits on the update cadence but before the decay window.
        session.iteration = 4;
        trainer
            .decay_learning_rates(&mut session, &mut g_opt, &mut d_opt)
            .unwrap();
        assert!((session.g_lr - 1e-4).abs() < 1e-12);
        assert!((session.d_lr - 2e-4).abs() < 1e-12);

        // Iteration 14 is inside the final ten iterations, so both rates
        // drop by one step of the linear schedule.
        session.iteration = 14;
        trainer
            .decay_learning_rates(&mut session, &mut g_opt, &mut d_opt)
            .unwrap();
        assert!((session.g_lr - 9e-5).abs() < 1e-12);
        assert!((session.d_lr - 1.8e-4).abs() < 1e-12);

        // Off-cadence iterations never touch the rates.
        session.iteration = 15;
        trainer
            .decay_learning_rates(&mut session, &mut g_opt, &mut d_opt)
            .unwrap();
        assert!((session.g_lr - 9e-5).abs() < 1e-12);
    }
}
