// ============================================================
// Layer 5 — Pretrained Body Loader
// ============================================================
// Fills a freshly initialised classifier with the pretrained
// DistilBERT weights from `model.safetensors`.
//
// Key mapping (HF → module path):
//   [distilbert.]embeddings.*      → distilbert.embeddings.*
//   [distilbert.]transformer.*     → distilbert.transformer.*
//   *.LayerNorm.*                  → *.layer_norm.*
//   layer norm weight / bias       → gamma / beta
//   linear weight [out, in]        → transposed to [in, out]
//
// Tensors the body does not use (MLM head, pooler) are ignored.
// Body tensors absent from the file keep their random init and
// are reported; the classification head is never loaded.

use std::collections::HashMap;
use std::path::Path;

use burn::{
    module::Param,
    nn::{Embedding, LayerNorm, Linear},
    prelude::*,
};
use safetensors::{tensor::Dtype, SafeTensors};

use crate::domain::error::PipelineError;
use crate::infra::hub::{PretrainedSource, CONFIG_FILE, WEIGHTS_FILE};
use crate::ml::classifier::{ClassifierConfig, DistilBertClassifier, BODY_PATH};
use crate::ml::distilbert::DistilBertConfig;
use crate::ml::trace::ParamData;

/// Outcome of filling the body from a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub applied: usize,
    pub missing: Vec<String>,
}

/// Read the body architecture from the pretrained `config.json`.
pub fn load_body_config(source: &PretrainedSource) -> Result<DistilBertConfig, PipelineError> {
    let path = source
        .resolve(CONFIG_FILE)
        .map_err(|e| PipelineError::pretrained(source.id(), e))?;
    let json = std::fs::read_to_string(&path)
        .map_err(|e| PipelineError::pretrained(source.id(), format!("cannot read '{}': {e}", path.display())))?;
    serde_json::from_str(&json)
        .map_err(|e| PipelineError::pretrained(source.id(), format!("invalid config.json: {e}")))
}

/// Build a classifier with `num_labels` outputs whose body holds the
/// pretrained weights.
pub fn from_pretrained<B: Backend>(
    source:     &PretrainedSource,
    num_labels: usize,
    device:     &B::Device,
) -> Result<(DistilBertClassifier<B>, ClassifierConfig), PipelineError> {
    let body   = load_body_config(source)?;
    let config = ClassifierConfig::new(body).with_num_labels(num_labels);
    let model  = config.init::<B>(device);

    let path = source
        .resolve(WEIGHTS_FILE)
        .map_err(|e| PipelineError::pretrained(source.id(), e))?;
    let tensors = read_safetensors(&path).map_err(|e| PipelineError::pretrained(source.id(), e))?;

    let (model, report) = apply_body(model, &tensors, device)
        .map_err(|e| PipelineError::pretrained(source.id(), e))?;

    if report.applied == 0 {
        return Err(PipelineError::pretrained(source.id(), "no body tensors matched the checkpoint"));
    }
    if !report.missing.is_empty() {
        tracing::warn!(
            "{} body tensors missing from checkpoint, left at random init: {:?}",
            report.missing.len(),
            report.missing
        );
    }
    tracing::info!("Loaded {} pretrained tensors from '{}'", report.applied, source.id());
    Ok((model, config))
}

/// Read every f32 tensor, keyed by its normalised module path.
pub fn read_safetensors(path: &Path) -> Result<HashMap<String, ParamData>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
    let st = SafeTensors::deserialize(&bytes).map_err(|e| format!("invalid safetensors file: {e}"))?;

    let mut out = HashMap::new();
    for (name, view) in st.tensors() {
        if view.dtype() != Dtype::F32 {
            tracing::debug!("Skipping '{name}' with dtype {:?}", view.dtype());
            continue;
        }
        let values = view
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        out.insert(normalize_key(&name), ParamData { shape: view.shape().to_vec(), values });
    }
    Ok(out)
}

/// `embeddings.LayerNorm.weight` → `distilbert.embeddings.layer_norm.weight`
pub fn normalize_key(key: &str) -> String {
    let key = key.replace("LayerNorm", "layer_norm");
    if key.starts_with("embeddings.") || key.starts_with("transformer.") {
        format!("{BODY_PATH}.{key}")
    } else {
        key
    }
}

/// Copy matching tensors into the body. Shape mismatches are errors.
pub fn apply_body<B: Backend>(
    mut model: DistilBertClassifier<B>,
    tensors:   &HashMap<String, ParamData>,
    device:    &B::Device,
) -> Result<(DistilBertClassifier<B>, LoadReport), String> {
    let mut loader = BodyLoader { tensors, device, report: LoadReport::default() };
    let body = &mut model.distilbert;

    let emb = format!("{BODY_PATH}.embeddings");
    loader.embedding(&mut body.embeddings.word_embeddings, &format!("{emb}.word_embeddings"))?;
    loader.embedding(&mut body.embeddings.position_embeddings, &format!("{emb}.position_embeddings"))?;
    loader.layer_norm(&mut body.embeddings.layer_norm, &format!("{emb}.layer_norm"))?;

    for (i, block) in body.transformer.layer.iter_mut().enumerate() {
        let p = format!("{BODY_PATH}.transformer.layer.{i}");
        loader.linear(&mut block.attention.q_lin, &format!("{p}.attention.q_lin"))?;
        loader.linear(&mut block.attention.k_lin, &format!("{p}.attention.k_lin"))?;
        loader.linear(&mut block.attention.v_lin, &format!("{p}.attention.v_lin"))?;
        loader.linear(&mut block.attention.out_lin, &format!("{p}.attention.out_lin"))?;
        loader.layer_norm(&mut block.sa_layer_norm, &format!("{p}.sa_layer_norm"))?;
        loader.linear(&mut block.ffn.lin1, &format!("{p}.ffn.lin1"))?;
        loader.linear(&mut block.ffn.lin2, &format!("{p}.ffn.lin2"))?;
        loader.layer_norm(&mut block.output_layer_norm, &format!("{p}.output_layer_norm"))?;
    }

    let report = loader.report;
    Ok((model, report))
}

struct BodyLoader<'a, B: Backend> {
    tensors: &'a HashMap<String, ParamData>,
    device:  &'a B::Device,
    report:  LoadReport,
}

impl<B: Backend> BodyLoader<'_, B> {
    fn take<const D: usize>(&mut self, key: &str, expected: [usize; D]) -> Result<Option<Tensor<B, D>>, String> {
        let Some(data) = self.tensors.get(key) else {
            self.report.missing.push(key.to_string());
            return Ok(None);
        };
        if data.shape != expected {
            return Err(format!("'{key}' has shape {:?}, expected {:?}", data.shape, expected));
        }
        self.report.applied += 1;
        let tensor = Tensor::from_data(TensorData::new(data.values.clone(), expected.to_vec()), self.device);
        Ok(Some(tensor))
    }

    fn embedding(&mut self, layer: &mut Embedding<B>, path: &str) -> Result<(), String> {
        if let Some(w) = self.take::<2>(&format!("{path}.weight"), layer.weight.val().dims())? {
            layer.weight = Param::from_tensor(w);
        }
        Ok(())
    }

    fn layer_norm(&mut self, layer: &mut LayerNorm<B>, path: &str) -> Result<(), String> {
        let dims = layer.gamma.val().dims();
        if let Some(g) = self.take::<1>(&format!("{path}.weight"), dims)? {
            layer.gamma = Param::from_tensor(g);
        }
        if let Some(b) = self.take::<1>(&format!("{path}.bias"), dims)? {
            layer.beta = Param::from_tensor(b);
        }
        Ok(())
    }

    fn linear(&mut self, layer: &mut Linear<B>, path: &str) -> Result<(), String> {
        // HF stores [out, in]; the module keeps [in, out].
        let [d_in, d_out] = layer.weight.val().dims();
        if let Some(w) = self.take::<2>(&format!("{path}.weight"), [d_out, d_in])? {
            layer.weight = Param::from_tensor(w.transpose());
        }
        if layer.bias.is_some() {
            if let Some(b) = self.take::<1>(&format!("{path}.bias"), [d_out])? {
                layer.bias = Some(Param::from_tensor(b));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::classifier::testing::tiny_config;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    type B = NdArray;

    #[test]
    fn test_normalize_key() {
        assert_eq!(
            normalize_key("embeddings.LayerNorm.weight"),
            "distilbert.embeddings.layer_norm.weight"
        );
        assert_eq!(
            normalize_key("distilbert.transformer.layer.0.ffn.lin1.bias"),
            "distilbert.transformer.layer.0.ffn.lin1.bias"
        );
        assert_eq!(normalize_key("vocab_projector.bias"), "vocab_projector.bias");
    }

    #[test]
    fn test_linear_weight_is_transposed_on_load() {
        let device = NdArrayDevice::default();
        let model  = tiny_config(120).init::<B>(&device);
        let dim    = model.distilbert.transformer.layer[0].attention.q_lin.weight.val().dims()[0];

        // HF layout [out, in]: row r holds the weights of output r.
        let values: Vec<f32> = (0..dim * dim).map(|v| v as f32).collect();
        let mut tensors = HashMap::new();
        tensors.insert(
            "distilbert.transformer.layer.0.attention.q_lin.weight".to_string(),
            ParamData { shape: vec![dim, dim], values },
        );

        let (model, report) = apply_body(model, &tensors, &device).unwrap();
        assert_eq!(report.applied, 1);
        assert!(!report.missing.is_empty());

        let w: Vec<f32> = model.distilbert.transformer.layer[0]
            .attention.q_lin.weight.val().into_data().to_vec().unwrap();
        // module[in=1, out=0] == hf[out=0, in=1]
        assert_eq!(w[dim], 1.0);
        assert_eq!(w[1], dim as f32);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let device = NdArrayDevice::default();
        let model  = tiny_config(120).init::<B>(&device);
        let mut tensors = HashMap::new();
        tensors.insert(
            "distilbert.embeddings.word_embeddings.weight".to_string(),
            ParamData { shape: vec![3, 3], values: vec![0.0; 9] },
        );
        assert!(apply_body(model, &tensors, &device).is_err());
    }

    #[test]
    fn test_missing_local_config_is_pretrained_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = from_pretrained::<B>(&PretrainedSource::Local(dir.path().into()), 2, &NdArrayDevice::default())
            .unwrap_err();
        assert_eq!(err.kind(), "PretrainedUnavailable");
    }
}
