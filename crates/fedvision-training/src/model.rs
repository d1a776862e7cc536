//! EfficientNet family and classifier-head surgery.
//!
//! Architecture:
//! - Input: 3xHxW (224x224 for ImageNet weights)
//! - Stem: Conv 3x3, stride 2
//! - Seven stages of MBConv blocks with squeeze-and-excitation and SiLU
//! - Head: Conv 1x1 to 1280 (scaled) channels
//! - Classifier: global average pooling, dropout, `fc`

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};
use fedvision_core::Entrypoint;
use tracing::info;

/// Number of ImageNet classes of the pretrained heads
pub const IMAGENET_CLASSES: usize = 1000;

/// A model that maps an image batch to class logits
pub trait ImageClassifier<B: Backend> {
    /// `[batch, 3, height, width]` to `[batch, num_classes]`
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// One MBConv stage of the B0 baseline
#[derive(Debug, Clone, Copy)]
struct StageSpec {
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
}

const fn stage(
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    in_channels: usize,
    out_channels: usize,
    repeats: usize,
) -> StageSpec {
    StageSpec {
        expand_ratio,
        kernel,
        stride,
        in_channels,
        out_channels,
        repeats,
    }
}

const B0_STAGES: [StageSpec; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

const STEM_CHANNELS: usize = 32;
const HEAD_CHANNELS: usize = 1280;
const CHANNEL_DIVISOR: usize = 8;

/// Configuration for an EfficientNet variant
#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    /// Channel multiplier
    #[config(default = "1.0")]
    pub width_coefficient: f64,

    /// Block-repeat multiplier
    #[config(default = "1.0")]
    pub depth_coefficient: f64,

    /// Dropout before the classifier
    #[config(default = "0.2")]
    pub dropout: f64,

    /// Number of output classes
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Size squeeze-excitation from the expanded width instead of the block input
    #[config(default = "false")]
    pub wide_se: bool,

    /// Squeeze-excitation reduction ratio
    #[config(default = "0.25")]
    pub se_ratio: f64,
}

impl EfficientNetConfig {
    /// EfficientNet-B0 with an ImageNet head
    pub fn b0() -> Self {
        Self::new()
    }

    /// EfficientNet-B4 with an ImageNet head
    pub fn b4() -> Self {
        Self::new()
            .with_width_coefficient(1.4)
            .with_depth_coefficient(1.8)
            .with_dropout(0.4)
    }

    /// Architecture behind a hub entrypoint
    pub fn for_entrypoint(entrypoint: Entrypoint) -> Self {
        match entrypoint {
            Entrypoint::EfficientNetB0 => Self::b0(),
            Entrypoint::EfficientNetB4 => Self::b4(),
            Entrypoint::EfficientNetWideSeB0 => Self::b0().with_wide_se(true),
            Entrypoint::EfficientNetWideSeB4 => Self::b4().with_wide_se(true),
        }
    }

    /// Scales a channel count by the width coefficient, rounded to a multiple of 8
    pub fn round_filters(&self, channels: usize) -> usize {
        let scaled = channels as f64 * self.width_coefficient;
        let divisor = CHANNEL_DIVISOR as f64;
        let mut rounded = (((scaled + divisor / 2.0) / divisor).floor() * divisor).max(divisor);
        if rounded < 0.9 * scaled {
            rounded += divisor;
        }
        rounded as usize
    }

    /// Scales a block count by the depth coefficient, rounding up
    pub fn round_repeats(&self, repeats: usize) -> usize {
        (repeats as f64 * self.depth_coefficient).ceil() as usize
    }

    /// Width of the features fed to the classifier
    pub fn feature_channels(&self) -> usize {
        self.round_filters(HEAD_CHANNELS)
    }

    /// Initializes a randomly weighted model
    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let stem_channels = self.round_filters(STEM_CHANNELS);
        let stem = ConvBn::new(3, stem_channels, 3, 2, 1, device);

        let mut blocks = Vec::new();
        for spec in B0_STAGES {
            let in_channels = self.round_filters(spec.in_channels);
            let out_channels = self.round_filters(spec.out_channels);
            for i in 0..self.round_repeats(spec.repeats) {
                let (block_in, stride) = if i == 0 {
                    (in_channels, spec.stride)
                } else {
                    (out_channels, 1)
                };
                blocks.push(MbConv::new(
                    block_in,
                    out_channels,
                    spec.expand_ratio,
                    spec.kernel,
                    stride,
                    self,
                    device,
                ));
            }
        }

        let last_block_channels = self.round_filters(B0_STAGES[B0_STAGES.len() - 1].out_channels);
        let head = ConvBn::new(last_block_channels, self.feature_channels(), 1, 1, 1, device);

        EfficientNet {
            features: Features { stem, blocks, head },
            classifier: ClassifierHead {
                pooling: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
                dropout: DropoutConfig::new(self.dropout).init(),
                fc: LinearConfig::new(self.feature_channels(), self.num_classes).init(device),
            },
        }
    }
}

/// Convolution followed by batch norm
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Channel attention: pool, reduce, expand, gate
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale
    }
}

/// Inverted residual block
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand: Option<ConvBn<B>>,
    pub depthwise: ConvBn<B>,
    pub se: SqueezeExcitation<B>,
    pub project: ConvBn<B>,
}

impl<B: Backend> MbConv<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        config: &EfficientNetConfig,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let expand = (expand_ratio != 1).then(|| ConvBn::new(in_channels, hidden, 1, 1, 1, device));
        let depthwise = ConvBn::new(hidden, hidden, kernel, stride, hidden, device);

        let se_base = if config.wide_se { hidden } else { in_channels };
        let squeeze_channels = ((se_base as f64 * config.se_ratio) as usize).max(1);
        let se = SqueezeExcitation::new(hidden, squeeze_channels, device);

        let project = ConvBn::new(hidden, out_channels, 1, 1, 1, device);

        Self {
            expand,
            depthwise,
            se,
            project,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => silu(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = silu(self.depthwise.forward(x));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        // Skip connection when stride is 1 and the width is unchanged
        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

/// Convolutional trunk
#[derive(Module, Debug)]
pub struct Features<B: Backend> {
    pub stem: ConvBn<B>,
    pub blocks: Vec<MbConv<B>>,
    pub head: ConvBn<B>,
}

impl<B: Backend> Features<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = silu(self.stem.forward(x));
        for block in &self.blocks {
            x = block.forward(x);
        }
        silu(self.head.forward(x))
    }
}

/// Pooling, dropout and the final linear layer
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub pooling: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub fc: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pooling.forward(x);

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);

        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }
}

/// EfficientNet image classifier
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub features: Features<B>,
    pub classifier: ClassifierHead<B>,
}

impl<B: Backend> EfficientNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.classifier.forward(self.features.forward(images))
    }

    /// Input width of the classifier layer
    pub fn classifier_in_features(&self) -> usize {
        self.classifier.fc.weight.dims()[0]
    }

    /// Output width of the classifier layer
    pub fn num_classes(&self) -> usize {
        self.classifier.fc.weight.dims()[1]
    }
}

impl<B: Backend> ImageClassifier<B> for EfficientNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        EfficientNet::forward(self, images)
    }
}

/// Swaps `classifier.fc` for a fresh layer with `classes` outputs.
///
/// The new layer keeps the old input width and lives on the old layer's device.
pub fn replace_classifying_layer<B: Backend>(mut model: EfficientNet<B>, classes: usize) -> EfficientNet<B> {
    let in_features = model.classifier_in_features();
    let device = model.classifier.fc.weight.device();

    info!(
        "Replacing classifier head: {} -> {} classes ({} input features)",
        model.num_classes(),
        classes,
        in_features
    );
    model.classifier.fc = LinearConfig::new(in_features, classes).init(&device);
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_round_filters() {
        let b0 = EfficientNetConfig::b0();
        assert_eq!(b0.round_filters(32), 32);
        assert_eq!(b0.round_filters(1280), 1280);

        let b4 = EfficientNetConfig::b4();
        assert_eq!(b4.round_filters(32), 48);
        assert_eq!(b4.round_filters(16), 24);
        assert_eq!(b4.round_filters(320), 448);
        assert_eq!(b4.feature_channels(), 1792);
    }

    #[test]
    fn test_round_repeats() {
        let b4 = EfficientNetConfig::b4();
        assert_eq!(b4.round_repeats(1), 2);
        assert_eq!(b4.round_repeats(3), 6);
        assert_eq!(b4.round_repeats(4), 8);
    }

    #[test]
    fn test_b0_block_count() {
        let device = Default::default();
        let model = EfficientNetConfig::b0().init::<TestBackend>(&device);
        assert_eq!(model.features.blocks.len(), 16);
        assert_eq!(model.classifier_in_features(), 1280);
        assert_eq!(model.num_classes(), IMAGENET_CLASSES);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = EfficientNetConfig::b0()
            .with_num_classes(7)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 7]);
    }

    #[test]
    fn test_wide_se_squeeze_width() {
        let device = Default::default();
        let narrow = EfficientNetConfig::b0().init::<TestBackend>(&device);
        let wide = EfficientNetConfig::b0().with_wide_se(true).init::<TestBackend>(&device);

        // Second block: 16 -> 24, expand 6, hidden 96
        assert_eq!(narrow.features.blocks[1].se.reduce.weight.dims()[0], 4);
        assert_eq!(wide.features.blocks[1].se.reduce.weight.dims()[0], 24);
    }

    #[test]
    fn test_replace_classifying_layer() {
        let device = Default::default();
        let model = EfficientNetConfig::b0().init::<TestBackend>(&device);
        let model = replace_classifying_layer(model, 10);

        assert_eq!(model.classifier.fc.weight.dims(), [1280, 10]);
        assert_eq!(model.classifier.fc.bias.as_ref().map(|b| b.dims()), Some([10]));

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [1, 10]);
    }
}
