//! Fused sum-of-squares reduction for the Frobenius norm.
//!
//! Stage one squares inline while reducing one matrix axis with the
//! `cubek-reduce` unit routine, driven by the [`SumSquared`] instruction.
//! Each unit folds a whole vector on its own: the cube and plane routines
//! feed merged partials back through `reduce`, which would square them
//! a second time.
//! Stage two folds the remaining vector with the stock `Sum` reduce, and
//! [`finalize_norm_kernel`] turns the sum into the norm or into the
//! reciprocal scale `1 / (norm + eps)`.

use cubecl_core as cubecl;
use cubecl_core::prelude::*;
use cubek_reduce::components::args::{init_tensors, TensorArgs};
use cubek_reduce::components::global::unit::GlobalFullUnitReduce;
use cubek_reduce::components::instructions::{
    ReduceCoordinate, ReduceFamily, ReduceInstruction, ReduceRequirements,
};
use cubek_reduce::launch::{generate_line_size, LineSizeStrategy};
use cubek_reduce::routines::unit::{UnitRoutine, UnitStrategy};
use cubek_reduce::routines::{
    BlueprintStrategy, GlobalReduceBlueprint, ReduceLineSettings, ReduceProblem, Routine,
    UnitReduceBlueprint,
};
use cubek_reduce::{LineMode, ReduceDtypes, ReducePrecision};

use crate::{MuonError, MuonResult};

/// Reduce by summing squared values: sum(x_i^2)
///
/// Squares in the reading loop, so no squared copy of the matrix is ever
/// written.
#[derive(Debug, CubeType, Clone)]
pub struct SumSquared {}

impl ReduceFamily for SumSquared {
    type Instruction<P: ReducePrecision> = Self;
    type Config = ();
}

#[cube]
impl<P: ReducePrecision> ReduceInstruction<P> for SumSquared {
    type AccumulatorItem = Line<P::EA>;
    type SharedAccumulator = SharedMemory<Line<P::EA>>;
    type Config = ();

    fn requirements(_this: &Self) -> ReduceRequirements {
        ReduceRequirements { coordinates: false }
    }

    fn from_config(_config: Self::Config) -> Self {
        SumSquared {}
    }

    fn null_input(_this: &Self, #[comptime] line_size: usize) -> Line<P::EI> {
        Line::empty(line_size).fill(P::EI::from_int(0))
    }

    fn null_accumulator(_this: &Self, #[comptime] line_size: usize) -> Self::AccumulatorItem {
        Line::empty(line_size).fill(P::EA::from_int(0))
    }

    fn assign_accumulator(
        _this: &Self,
        destination: &mut Self::AccumulatorItem,
        source: &Self::AccumulatorItem,
    ) {
        *destination = *source;
    }

    fn read_accumulator(
        _this: &Self,
        accumulator: &Self::AccumulatorItem,
    ) -> (Line<P::EI>, ReduceCoordinate) {
        (
            Line::cast_from(*accumulator),
            ReduceCoordinate::new_NotRequired(),
        )
    }

    fn reduce(
        _this: &Self,
        accumulator: &Self::AccumulatorItem,
        item: Line<P::EI>,
        _coordinate: ReduceCoordinate,
        #[comptime] use_planes: bool,
    ) -> Self::AccumulatorItem {
        // Square after widening, so bf16 inputs do not round the square
        let wide: Line<P::EA> = Line::cast_from(item);
        let squared = wide * wide;

        if use_planes {
            *accumulator + plane_sum(squared)
        } else {
            *accumulator + squared
        }
    }

    fn fuse_accumulators(
        _this: &Self,
        lhs: Self::AccumulatorItem,
        rhs: Self::AccumulatorItem,
    ) -> Self::AccumulatorItem {
        lhs + rhs
    }

    fn merge_line<Out: Numeric>(
        _this: &Self,
        accumulator: Self::AccumulatorItem,
        _shape_axis_reduce: usize,
    ) -> Out {
        let mut sum = P::EA::from_int(0);
        #[unroll]
        for k in 0..accumulator.size() {
            sum += accumulator[k];
        }
        Out::cast_from(sum)
    }

    fn to_output_perpendicular<Out: Numeric>(
        _this: &Self,
        accumulator: Self::AccumulatorItem,
        _shape_axis_reduce: usize,
    ) -> Line<Out> {
        Line::cast_from(accumulator)
    }
}

/// One unit per output element reduces `axis` of `input` with [`SumSquared`].
#[cube(launch_unchecked)]
pub fn sum_squared_kernel<EG: Float, EA: Float>(
    input: &Tensor<Line<EG>>,
    output: &mut Tensor<Line<EA>>,
    axis_reduce: usize,
    #[comptime] line_mode: LineMode,
    #[comptime] blueprint: UnitReduceBlueprint,
) {
    let (input, mut output) = init_tensors::<TensorArgs, EG, EA>(input, output);
    let inst = SumSquared {};

    GlobalFullUnitReduce::execute::<(EG, EA), EA, SumSquared>(
        &input,
        &mut output,
        axis_reduce,
        &inst,
        line_mode,
        blueprint,
    );
}

/// Finalize: out[0] = sqrt(sum[0]), or 1 / (sqrt(sum[0]) + eps) when
/// `invert` is set.
#[cube(launch)]
pub fn finalize_norm_kernel<EA: Float>(
    sum: &Tensor<EA>,
    out: &mut Tensor<EA>,
    eps: f32,
    #[comptime] invert: bool,
) {
    if ABSOLUTE_POS == 0 {
        let norm = EA::sqrt(sum[0]);
        if invert {
            out[0] = EA::new(1.0) / (norm + EA::cast_from(eps));
        } else {
            out[0] = norm;
        }
    }
}

/// Reduce `axis` of `input` into `output` (same shape, `axis` set to 1),
/// summing squares in `EA`.
///
/// `input` may have any strides. The routine picks parallel lines when the
/// reduced axis is contiguous and perpendicular lines otherwise.
pub fn launch_sum_squared<R: Runtime, EG: Float, EA: Float>(
    client: &ComputeClient<R>,
    input: &TensorHandleRef<'_, R>,
    output: &TensorHandleRef<'_, R>,
    axis: usize,
) -> MuonResult<()> {
    let dtypes = ReduceDtypes {
        input: EG::as_type_native_unchecked(),
        output: EA::as_type_native_unchecked(),
        accumulation: EA::as_type_native_unchecked(),
    };
    let line_mode = match input.strides[axis] {
        1 => LineMode::Parallel,
        _ => LineMode::Perpendicular,
    };

    let (line_size_input, line_size_output) = generate_line_size::<R>(
        client,
        input,
        output,
        axis,
        dtypes.input,
        line_mode,
        &LineSizeStrategy {
            parallel_output_vectorization: false,
        },
    );

    let problem = ReduceProblem {
        vector_size: input.shape[axis],
        vector_count: output.shape.iter().product(),
        axis,
        dtypes,
    };
    let settings = ReduceLineSettings {
        line_mode,
        line_size_input,
        line_size_output,
    };

    let (blueprint, launch) = UnitRoutine.prepare(
        client,
        problem,
        settings,
        BlueprintStrategy::Inferred(UnitStrategy),
    )?;
    let GlobalReduceBlueprint::Unit(unit) = blueprint.global else {
        return Err(MuonError::device("unit routine produced a non-unit blueprint"));
    };

    tracing::trace!(
        shape = ?input.shape,
        axis,
        line_size_input,
        line_size_output,
        "launch sum squared"
    );

    // Surplus units are terminated by the blueprint's idle mode.
    unsafe {
        sum_squared_kernel::launch_unchecked::<EG, EA, R>(
            client,
            launch.cube_count,
            launch.cube_dim,
            input.as_tensor_arg(launch.line.line_size_input),
            output.as_tensor_arg(launch.line.line_size_output),
            ScalarArg::new(axis),
            blueprint.line_mode,
            unit,
        )?;
    }

    Ok(())
}
