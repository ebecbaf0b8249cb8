use candle_core::{Device, Tensor};
use ndarray::{Array, Array3, Array4, Dimension};

/// Copy an `f32` array into a tensor of the same shape on `device`.
pub fn to_tensor<D: Dimension>(arr: &Array<f32, D>, device: &Device) -> crate::Result<Tensor> {
    let data: Vec<f32> = arr.iter().copied().collect();
    Ok(Tensor::from_vec(data, arr.shape().to_vec(), device)?)
}

/// Copy a rank-3 tensor back into an array.
pub fn array3_from_tensor(t: &Tensor) -> crate::Result<Array3<f32>> {
    let dims = t.dims3()?;
    let data = t.flatten_all()?.to_vec1::<f32>()?;
    Array3::from_shape_vec(dims, data).map_err(|e| crate::Error::shape("rank-3 tensor", e))
}

/// Copy a rank-4 tensor back into an array.
pub fn array4_from_tensor(t: &Tensor) -> crate::Result<Array4<f32>> {
    let dims = t.dims4()?;
    let data = t.flatten_all()?.to_vec1::<f32>()?;
    Array4::from_shape_vec(dims, data).map_err(|e| crate::Error::shape("rank-4 tensor", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn roundtrip_preserves_order() {
        let arr = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as f32);
        let t = to_tensor(&arr, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3, 4]);
        let back = array3_from_tensor(&t).unwrap();
        assert_eq!(arr, back);
    }

    #[test]
    fn transposed_tensor_is_read_logically() {
        let arr = Array3::from_shape_fn((1, 2, 3), |(_, b, c)| (b * 3 + c) as f32);
        let t = to_tensor(&arr, &Device::Cpu).unwrap().transpose(1, 2).unwrap();
        let back = array3_from_tensor(&t).unwrap();
        assert_eq!(back[(0, 2, 1)], arr[(0, 1, 2)]);
    }
}
