use candle_core::{DType, Device, Tensor};
use pdfdex_embed::masked_mean_l2;

fn l2(v: &[f32]) -> Vec<f32> {
    let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / n).collect()
}

#[test]
fn pooling_skips_padding_per_row() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    // Batch of two sequences, three tokens, hidden dim 2.
    let hidden = Tensor::from_slice(
        &[1.0f32, 0.0, 3.0, 4.0, 100.0, 100.0, // row 0: last token is padding
          2.0, 2.0, 0.0, 6.0, 4.0, 1.0],      // row 1: no padding
        (2, 3, 2),
        &dev,
    )?;
    let mask = Tensor::from_slice(&[1u32, 1, 0, 1, 1, 1], (2, 3), &dev)?.to_dtype(DType::F32)?;

    let pooled: Vec<Vec<f32>> = masked_mean_l2(&hidden, &mask)?.to_vec2()?;

    let expected = [l2(&[2.0, 2.0]), l2(&[2.0, 3.0])];
    for (row, want) in pooled.iter().zip(expected.iter()) {
        for (a, b) in row.iter().zip(want) {
            assert!((a - b).abs() < 1e-5, "a={a} b={b}");
        }
    }
    Ok(())
}

#[test]
fn pooling_rejects_rank_two_input() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let hidden = Tensor::zeros((2, 4), DType::F32, &dev)?;
    let mask = Tensor::ones((2, 4), DType::F32, &dev)?;
    assert!(masked_mean_l2(&hidden, &mask).is_err());
    Ok(())
}
