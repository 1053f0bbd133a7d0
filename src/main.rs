use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use traj_eval_rs::tum;
use traj_eval_rs::{
    AlignmentConfig, AngleUnit, AssociationConfig, DeltaConfig, DeltaUnit, EvalConfig, EvalJob,
    Evaluation, FilterConfig, MetricKind, MotionFilter, PoseRelation, RotationConstraint,
    StatisticsType,
};

#[derive(Parser, Debug)]
#[command(name = "traj_eval")]
#[command(about = "Absolute / relative pose error of an estimated trajectory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Absolute pose error
    Ape {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Relative pose error
    Rpe {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        delta: DeltaArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Reference trajectory (TUM format, optionally .gz)
    ref_file: PathBuf,

    /// Estimated trajectory (TUM format, optionally .gz)
    est_file: PathBuf,

    /// Pose relation the error is computed on
    #[arg(short = 'r', long, value_enum, default_value_t = RelationArg::TransPart)]
    pose_relation: RelationArg,

    /// Align the estimate to the reference with Umeyama's method
    #[arg(short = 'a', long)]
    align: bool,

    /// Correct the scale (alone: scale only, with --align: Sim(3))
    #[arg(short = 's', long)]
    correct_scale: bool,

    /// Restrict the alignment rotation to yaw about +z
    #[arg(long)]
    yaw_only: bool,

    /// Use only the first N paired poses for the Umeyama alignment
    #[arg(long)]
    n_to_align: Option<usize>,

    /// Map the first estimate pose onto the first reference pose
    #[arg(long)]
    align_origin: bool,

    /// Keep at most N evenly spaced poses of each trajectory
    #[arg(long)]
    downsample: Option<usize>,

    /// Keep only poses after this much motion [m] [deg]
    #[arg(long, num_args = 2, value_names = ["DISTANCE", "ANGLE_DEG"])]
    motion_filter: Option<Vec<f64>>,

    /// Max. allowed time difference for matching poses [s]
    #[arg(long, default_value_t = 0.01)]
    t_max_diff: f64,

    /// Constant offset added to the estimate's timestamps [s]
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    t_offset: f64,

    /// Save the result archive (.json.gz)
    #[arg(long)]
    save_results: Option<PathBuf>,

    /// Write the aligned estimate as TUM text
    #[arg(long)]
    save_aligned: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DeltaArgs {
    /// Delta between the poses of a relative pair
    #[arg(short = 'd', long, default_value_t = 1.0)]
    delta: f64,

    /// Unit of the delta
    #[arg(short = 'u', long, value_enum, default_value_t = DeltaUnitArg::Frames)]
    delta_unit: DeltaUnitArg,

    /// Relative tolerance of non-frame deltas
    #[arg(long, default_value_t = 0.1)]
    delta_tol: f64,

    /// Use overlapping pairs from every start pose
    #[arg(long)]
    all_pairs: bool,

    /// Select the pairs on the reference instead of the estimate
    #[arg(long)]
    pairs_from_reference: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RelationArg {
    #[value(name = "full")]
    Full,
    #[value(name = "trans_part")]
    TransPart,
    #[value(name = "rot_part")]
    RotPart,
    #[value(name = "angle_deg")]
    AngleDeg,
    #[value(name = "angle_rad")]
    AngleRad,
    #[value(name = "point_distance")]
    PointDistance,
    #[value(name = "point_distance_error_ratio")]
    PointDistanceErrorRatio,
}

impl From<RelationArg> for PoseRelation {
    fn from(arg: RelationArg) -> Self {
        match arg {
            RelationArg::Full => PoseRelation::FullTransformation,
            RelationArg::TransPart => PoseRelation::TranslationPart,
            RelationArg::RotPart => PoseRelation::RotationChordal,
            RelationArg::AngleDeg => PoseRelation::RotationPart(AngleUnit::Degrees),
            RelationArg::AngleRad => PoseRelation::RotationPart(AngleUnit::Radians),
            RelationArg::PointDistance => PoseRelation::PointDistance,
            RelationArg::PointDistanceErrorRatio => PoseRelation::PointDistanceErrorRatio,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeltaUnitArg {
    #[value(alias = "f")]
    Frames,
    #[value(alias = "s")]
    Seconds,
    #[value(alias = "m")]
    Meters,
    #[value(alias = "r")]
    Radians,
    #[value(alias = "d")]
    Degrees,
}

impl From<DeltaUnitArg> for DeltaUnit {
    fn from(arg: DeltaUnitArg) -> Self {
        match arg {
            DeltaUnitArg::Frames => DeltaUnit::Frames,
            DeltaUnitArg::Seconds => DeltaUnit::Seconds,
            DeltaUnitArg::Meters => DeltaUnit::Meters,
            DeltaUnitArg::Radians => DeltaUnit::Radians,
            DeltaUnitArg::Degrees => DeltaUnit::Degrees,
        }
    }
}

impl CommonArgs {
    fn eval_config(&self, delta: Option<&DeltaArgs>) -> EvalConfig {
        let rotation_constraint = if self.yaw_only {
            RotationConstraint::YawOnly
        } else {
            RotationConstraint::None
        };
        let mut config = EvalConfig::default()
            .with_pose_relation(self.pose_relation.into())
            .with_association(AssociationConfig {
                max_diff: self.t_max_diff,
                offset: self.t_offset,
            })
            .with_alignment(AlignmentConfig {
                align: self.align,
                correct_scale: self.correct_scale,
                rotation_constraint,
                n_to_align: self.n_to_align,
                align_origin: self.align_origin,
            })
            .with_filter(FilterConfig {
                downsample: self.downsample,
                motion: match self.motion_filter.as_deref() {
                    Some(&[distance, angle_deg]) => Some(MotionFilter {
                        distance,
                        angle_deg,
                    }),
                    _ => None,
                },
            });
        if let Some(d) = delta {
            config = config.with_delta(DeltaConfig {
                delta: d.delta,
                unit: d.delta_unit.into(),
                rel_tolerance: d.delta_tol,
                all_pairs: d.all_pairs,
                pairs_from_reference: d.pairs_from_reference,
            });
        }
        config
    }
}

fn print_result(evaluation: &Evaluation) {
    println!("{}", evaluation.title());
    if let Some(tf) = &evaluation.alignment {
        let t = &tf.translation;
        println!(
            "Alignment: rotation angle {:.6} rad, translation [{:.6}, {:.6}, {:.6}], scale {:.6}",
            tf.rotation.angle(),
            t.x,
            t.y,
            t.z,
            tf.scale
        );
    }
    println!(
        "Matched {} poses ({} discarded), {} error values",
        evaluation.association.len(),
        evaluation.association.num_discarded,
        evaluation.errors.len()
    );
    println!();
    for stat in StatisticsType::ALL {
        println!("{:>10}\t{:.6}", stat.name(), evaluation.statistics.get(stat));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (metric, common, delta) = match &cli.command {
        Command::Ape { common } => (MetricKind::Ape, common, None),
        Command::Rpe { common, delta } => (MetricKind::Rpe, common, Some(delta)),
    };

    let job = EvalJob {
        metric,
        reference: tum::read_tum(&common.ref_file)?,
        estimate: tum::read_tum(&common.est_file)?,
        config: common.eval_config(delta),
    };
    let evaluation = job.run()?;
    print_result(&evaluation);

    if let Some(path) = &common.save_results {
        evaluation.to_archive().save(path)?;
    }
    if let Some(path) = &common.save_aligned {
        tum::write_tum(path, &evaluation.aligned_estimate)?;
        log::info!("Wrote aligned estimate to {}", path.display());
    }
    Ok(())
}
