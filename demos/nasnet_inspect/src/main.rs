use bimm_nasnet::layers::blocks::conv_norm::ConvNorm2dMeta;
use bimm_nasnet::models::nasnet::cell::CellKind;
use bimm_nasnet::models::nasnet::nasnet_model::{CellPlan, NasNet};
use bimm_nasnet::models::nasnet::prefabs::{PREFAB_NASNET_MAP, try_lookup_prefab};
use burn::backend::NdArray;
use burn::module::Module;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List the known pre-fabs and exit.
    #[arg(long)]
    list: bool,

    /// Name of the model pre-fab.
    #[arg(long, default_value = "nasnet_a_mobile")]
    prefab: String,

    /// Number of classes.
    #[arg(long, default_value = "1000")]
    num_classes: usize,

    /// Override the (square) input resolution.
    #[arg(long)]
    resolution: Option<usize>,

    /// Drop the auxiliary head.
    #[arg(long)]
    no_aux: bool,

    /// Print the cell plan as JSON.
    #[arg(long)]
    json: bool,

    /// Run a forward pass on a random batch.
    #[arg(long)]
    forward: bool,

    /// Batch size for the forward pass.
    #[arg(long, default_value = "1")]
    batch_size: usize,
}

fn print_plan(plan: &[CellPlan]) {
    println!(
        "{:>4} {:>10} {:>7} {:>6} {:>6} {:>6} {:>5} {:>9}",
        "cell", "kind", "filters", "in", "prev", "out", "level", "res"
    );
    for cell in plan {
        let kind = match cell.kind {
            CellKind::Normal => "normal",
            CellKind::Reduction => "reduction",
        };
        let prev = cell
            .prev_channels
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let res = format!("{}x{}", cell.resolution[0], cell.resolution[1]);
        println!(
            "{:>4} {:>10} {:>7} {:>6} {:>6} {:>6} {:>5} {:>9}{}",
            cell.index,
            kind,
            cell.filters,
            cell.in_channels,
            prev,
            cell.out_channels,
            cell.level,
            res,
            if cell.aux_tap { "  <- aux" } else { "" }
        );
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nasnet_inspect=info,bimm_nasnet=info".into()),
        )
        .init();

    let args = Args::parse();
    type B = NdArray<f32>;
    let device = Default::default();

    if args.list {
        for (name, prefab) in PREFAB_NASNET_MAP.to_map().items {
            println!("{name:<16} {}", prefab.description);
        }
        return Ok(());
    }

    tracing::debug!(known = ?PREFAB_NASNET_MAP.names(), "Looking up pre-fab");
    let prefab = try_lookup_prefab(&args.prefab)?;

    let mut contract = prefab
        .new_config()
        .with_num_classes(args.num_classes)
        .with_use_aux(!args.no_aux);
    if let Some(res) = args.resolution {
        contract = contract.with_input_resolution([res, res]);
    }

    let config = contract.try_to_structure()?;
    let plan = config.cell_plan();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}: {}", prefab.name, prefab.description);
        print_plan(&plan);
    }

    let model: NasNet<B> = config.init(&device);
    tracing::info!(prefab = %prefab.name, "Initialized model");
    println!("parameters: {}", model.num_params());
    println!("feature channels: {}", model.feature_channels());

    if args.forward {
        let [height, width] = config.input_resolution;
        let input = Tensor::random(
            [args.batch_size, config.stem.in_channels(), height, width],
            Distribution::Default,
            &device,
        );

        let output = model.forward_with_aux(input);
        println!("main: {:?}", output.main.dims());
        if let Some(aux) = &output.aux {
            println!("aux: {:?}", aux.dims());
        }

        let top: Vec<f32> = output.main.max_dim(1).into_data().iter::<f32>().collect();
        println!("top probabilities: {top:?}");
    }

    Ok(())
}
