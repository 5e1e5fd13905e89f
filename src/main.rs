use std::path::PathBuf;

use anyhow::Result;
use attention::derivation::{
    dot_product, scale_scores, similarity_scores_einsum, similarity_scores_loop,
    similarity_scores_matmul, weight_values,
};
use attention::reference::stable_softmax_last_dim;
use attention::{Attention, ExactAttention};
use attention_primer::{setup_device, PrimerConfig};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use layers::SelfAttention;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scaled dot-product attention walkthrough", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "PATH", help = "Path to a TOML or JSON config file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Run on the CPU even when an accelerator is available")]
    force_cpu: bool,

    #[arg(long, help = "Number of tokens in the random sequence fed to the layer")]
    seq_len: Option<usize>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("attention-primer failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => PrimerConfig::from_path(path)?,
        None => PrimerConfig::default(),
    };
    if args.force_cpu {
        config.runtime.force_cpu = true;
    }

    let device = setup_device(&config.runtime)?;
    derivation_walkthrough(&device, &config)?;
    layer_walkthrough(&device, &config, args.seq_len.unwrap_or(5))?;
    Ok(())
}

fn derivation_walkthrough(device: &Device, config: &PrimerConfig) -> Result<()> {
    let query = [1f32, 2., 3., 4., 5., 6.];
    let keys = [[1f32, 0., -1., 2., 7., 4.], [1f32, 2., 3., 4., 7., 6.]];
    let values = [[1f32, 2., 3.], [10f32, 20., 30.]];
    let d_k = query.len();

    println!("1. dot products, one loop per pair");
    for (idx, key) in keys.iter().enumerate() {
        println!("   q . k{} = {}", idx + 1, dot_product(&query, key)?);
    }

    let q = Tensor::new(&[query], device)?;
    let k = Tensor::new(&keys, device)?;
    let v = Tensor::new(&values, device)?;

    let looped = similarity_scores_loop(&q, &k)?;
    println!("2. score matrix from loops:   {:?}", looped.to_vec2::<f32>()?);
    let scores = similarity_scores_matmul(&q, &k)?;
    println!("3. score matrix as Q . K^T:   {:?}", scores.to_vec2::<f32>()?);
    let einsum = similarity_scores_einsum(&q, &k)?;
    println!("4. score matrix as einsum:    {:?}", einsum.to_vec2::<f32>()?);

    let stacked_q = Tensor::stack(&[&q, &q.affine(0.1, 0.0)?], 0)?;
    let stacked_k = Tensor::stack(&[&k, &k], 0)?;
    let batched = similarity_scores_einsum(&stacked_q, &stacked_k)?;
    println!("5. batched multi-query scores {:?}", batched.to_vec3::<f32>()?);

    let scaled = scale_scores(&scores, d_k)?;
    println!("6. scaled by 1/sqrt({d_k}):      {:?}", scaled.to_vec2::<f32>()?);
    let weights = stable_softmax_last_dim(&scaled)?;
    println!("7. softmax weights:           {:?}", weights.to_vec2::<f32>()?);
    println!("8. weighted values:           {:?}", weight_values(&weights, &v)?.to_vec2::<f32>()?);

    let kernel = ExactAttention::with_config(config.kernel.clone());
    let out = kernel.attend(&q, &k, &v, d_k, true)?;
    println!("   kernel output:             {:?}", out.output.to_vec2::<f32>()?);
    Ok(())
}

fn layer_walkthrough(device: &Device, config: &PrimerConfig, seq_len: usize) -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let layer = SelfAttention::with_kernel_config(config.layer.clone(), config.kernel.clone(), vb)?;

    let x = Tensor::randn(0f32, 1.0, (seq_len, config.layer.d_model), device)?;
    let (weights, output) = layer.forward(&x)?.into_parts();

    println!(
        "self-attention layer: x {:?} -> output {:?} ({} parameter tensors)",
        x.dims(),
        output.dims(),
        varmap.all_vars().len()
    );
    if let Some(weights) = weights {
        println!("attention weights:");
        for row in weights.to_vec2::<f32>()? {
            let formatted: Vec<String> = row.iter().map(|w| format!("{w:.3}")).collect();
            println!("   [{}]", formatted.join(", "));
        }
    }
    Ok(())
}
