//! Declarative description of a sequential convolutional network.
//!
//! A [`Sequential`] is a stack of [`Layer`]s over a fixed input [`Shape`]. Adding a layer infers its output shape and parameter count, and rejects layers that can't accept the shape produced by the layer before them.
//! Nothing here evaluates a layer; the description is what a numerical backend would be built from, and what [`Sequential::summary`] reports.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a sliding window treats the borders of its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Padding {
    /// pad the input so the output has the same spatial size (for stride 1)
    Same,
    /// no padding; the window only visits positions where it fits entirely
    Valid,
}

/// Element-wise function applied to a layer's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Activation {
    /// identity
    Linear,
    /// max(0, x)
    Relu,
    /// normalize the outputs into a probability distribution
    Softmax,
}

/// The shape of a single sample (the batch dimension is implicit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// height x width x channels
    Image {
        /// rows
        height: usize,
        /// columns
        width: usize,
        /// channels per position
        channels: usize,
    },
    /// a flat vector
    Flat(usize),
}

impl Shape {
    /// the number of scalar values in a sample of this shape
    pub fn len(&self) -> usize {
        match *self {
            Shape::Image {
                height,
                width,
                channels,
            } => height * width * channels,
            Shape::Flat(len) => len,
        }
    }

    /// true if the shape holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Shape::Image {
                height,
                width,
                channels,
            } => write!(f, "(None, {}, {}, {})", height, width, channels),
            Shape::Flat(len) => write!(f, "(None, {})", len),
        }
    }
}

/// A single layer of a [`Sequential`] network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    /// 2D convolution with a square kernel and stride 1
    Conv2d {
        /// number of output channels
        filters: usize,
        /// side length of the square kernel
        kernel_size: usize,
        /// border handling
        padding: Padding,
        /// output activation
        activation: Activation,
    },
    /// 2D max pooling with a square window
    MaxPool2d {
        /// side length of the square window
        pool_size: usize,
        /// step between windows, in both directions
        strides: usize,
        /// border handling
        padding: Padding,
    },
    /// reshape an image into a flat vector
    Flatten,
    /// fully connected layer
    Dense {
        /// number of outputs
        units: usize,
        /// output activation
        activation: Activation,
    },
    /// randomly zero a fraction of the inputs during training
    Dropout {
        /// fraction of inputs dropped, in [0, 1)
        rate: f64,
    },
}

impl Layer {
    /// the base name used for this kind of layer in summaries
    pub fn kind_name(&self) -> &'static str {
        match self {
            Layer::Conv2d { .. } => "conv2d",
            Layer::MaxPool2d { .. } => "max_pooling2d",
            Layer::Flatten => "flatten",
            Layer::Dense { .. } => "dense",
            Layer::Dropout { .. } => "dropout",
        }
    }

    /// Infer the shape this layer produces from `input`.
    ///
    /// # Errors
    /// Returns an [`ArchitectureErrorKind`] if the layer can't accept `input` or one of its own parameters is invalid.
    pub fn output_shape(&self, input: Shape) -> Result<Shape, ArchitectureErrorKind> {
        match *self {
            Layer::Conv2d {
                filters,
                kernel_size,
                padding,
                ..
            } => {
                non_zero("filters", filters)?;
                non_zero("kernel_size", kernel_size)?;
                let (height, width, _) = expect_image(input)?;
                Ok(Shape::Image {
                    height: window_output(height, kernel_size, 1, padding)?,
                    width: window_output(width, kernel_size, 1, padding)?,
                    channels: filters,
                })
            }
            Layer::MaxPool2d {
                pool_size,
                strides,
                padding,
            } => {
                non_zero("pool_size", pool_size)?;
                non_zero("strides", strides)?;
                let (height, width, channels) = expect_image(input)?;
                Ok(Shape::Image {
                    height: window_output(height, pool_size, strides, padding)?,
                    width: window_output(width, pool_size, strides, padding)?,
                    channels,
                })
            }
            Layer::Flatten => Ok(Shape::Flat(input.len())),
            Layer::Dense { units, .. } => {
                non_zero("units", units)?;
                match input {
                    Shape::Flat(_) => Ok(Shape::Flat(units)),
                    image => Err(ArchitectureErrorKind::ExpectedFlatInput { found: image }),
                }
            }
            Layer::Dropout { rate } => {
                if !(0.0..1.0).contains(&rate) {
                    return Err(ArchitectureErrorKind::InvalidDropoutRate(rate));
                }
                Ok(input)
            }
        }
    }

    /// the number of trainable parameters (weights and biases) of this layer given its input shape
    pub fn parameter_count(&self, input: Shape) -> usize {
        match *self {
            Layer::Conv2d {
                filters,
                kernel_size,
                ..
            } => {
                let channels = match input {
                    Shape::Image { channels, .. } => channels,
                    Shape::Flat(_) => 0,
                };
                (kernel_size * kernel_size * channels + 1) * filters
            }
            Layer::Dense { units, .. } => (input.len() + 1) * units,
            Layer::MaxPool2d { .. } | Layer::Flatten | Layer::Dropout { .. } => 0,
        }
    }
}

fn non_zero(parameter: &'static str, value: usize) -> Result<(), ArchitectureErrorKind> {
    if value == 0 {
        return Err(ArchitectureErrorKind::ZeroSized { parameter });
    }
    Ok(())
}

fn expect_image(input: Shape) -> Result<(usize, usize, usize), ArchitectureErrorKind> {
    match input {
        Shape::Image {
            height,
            width,
            channels,
        } => Ok((height, width, channels)),
        flat => Err(ArchitectureErrorKind::ExpectedImageInput { found: flat }),
    }
}

/// output length along one spatial axis of a sliding window
fn window_output(
    input: usize,
    window: usize,
    stride: usize,
    padding: Padding,
) -> Result<usize, ArchitectureErrorKind> {
    match padding {
        Padding::Same => Ok(input.div_ceil(stride)),
        Padding::Valid => {
            if window > input {
                return Err(ArchitectureErrorKind::WindowLargerThanInput { window, input });
            }
            Ok((input - window) / stride + 1)
        }
    }
}

/// One row of a [`Sequential::summary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    /// unique layer name, e.g. `conv2d_1`
    pub name: String,
    /// the shape the layer produces
    pub output_shape: Shape,
    /// trainable parameters in the layer
    pub parameters: usize,
}

/// A sequential stack of layers over a fixed input shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SequentialSpec", into = "SequentialSpec")]
pub struct Sequential {
    input_shape: Shape,
    layers: Vec<Layer>,
    // output shape of each layer, parallel to `layers`
    shapes: Vec<Shape>,
}

/// the serialized form of a [`Sequential`]; shapes are re-inferred on load
#[derive(Clone, Serialize, Deserialize)]
struct SequentialSpec {
    input_shape: Shape,
    layers: Vec<Layer>,
}

impl Sequential {
    /// Create an empty network accepting samples of `input_shape`
    pub fn new(input_shape: Shape) -> Self {
        Sequential {
            input_shape,
            layers: Vec::new(),
            shapes: Vec::new(),
        }
    }

    /// Append `layer` to the network.
    ///
    /// # Errors
    /// Returns an [`ArchitectureError`] naming the layer's position if it can't accept the current output shape. The network is left unchanged.
    pub fn add(&mut self, layer: Layer) -> Result<&mut Self, ArchitectureError> {
        let shape = layer
            .output_shape(self.output_shape())
            .map_err(|kind| ArchitectureError {
                layer_index: self.layers.len(),
                kind,
            })?;
        self.layers.push(layer);
        self.shapes.push(shape);
        Ok(self)
    }

    /// the shape of a single input sample
    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    /// the shape produced by the last layer, or the input shape if there are no layers
    pub fn output_shape(&self) -> Shape {
        self.shapes.last().copied().unwrap_or(self.input_shape)
    }

    /// the layers, in order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Per-layer names, output shapes and parameter counts
    pub fn summary(&self) -> Vec<LayerSummary> {
        let mut seen: Vec<&'static str> = Vec::new();
        let mut input = self.input_shape;
        let mut rows = Vec::with_capacity(self.layers.len());
        for (layer, &shape) in self.layers.iter().zip(&self.shapes) {
            let kind = layer.kind_name();
            let previous = seen.iter().filter(|&&k| k == kind).count();
            seen.push(kind);
            let name = if previous == 0 {
                kind.to_string()
            } else {
                format!("{}_{}", kind, previous)
            };
            rows.push(LayerSummary {
                name,
                output_shape: shape,
                parameters: layer.parameter_count(input),
            });
            input = shape;
        }
        rows
    }

    /// total trainable parameters in the network
    pub fn parameter_count(&self) -> usize {
        self.summary().iter().map(|row| row.parameters).sum()
    }
}

impl fmt::Display for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rows = self.summary();
        writeln!(f, "{:<20} {:<22} {:>10}", "Layer", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(54))?;
        for row in rows.iter() {
            writeln!(
                f,
                "{:<20} {:<22} {:>10}",
                row.name,
                row.output_shape.to_string(),
                row.parameters
            )?;
        }
        writeln!(f, "{}", "=".repeat(54))?;
        write!(f, "Total params: {}", self.parameter_count())
    }
}

impl TryFrom<SequentialSpec> for Sequential {
    type Error = ArchitectureError;

    fn try_from(spec: SequentialSpec) -> Result<Self, Self::Error> {
        let mut model = Sequential::new(spec.input_shape);
        for layer in spec.layers {
            model.add(layer)?;
        }
        Ok(model)
    }
}

impl From<Sequential> for SequentialSpec {
    fn from(model: Sequential) -> Self {
        SequentialSpec {
            input_shape: model.input_shape,
            layers: model.layers,
        }
    }
}

/// The CIFAR-10 classifier: two blocks of paired 3x3 `same` convolutions (32 then 64 filters) each followed by 2x2 max pooling,
/// then two 128-unit dense layers with 20% dropout and a 10-way softmax output.
///
/// # Errors
/// Never fails in practice; the error is propagated from [`Sequential::add`].
pub fn cifar10_cnn() -> Result<Sequential, ArchitectureError> {
    let conv = |filters| Layer::Conv2d {
        filters,
        kernel_size: 3,
        padding: Padding::Same,
        activation: Activation::Relu,
    };
    let pool = Layer::MaxPool2d {
        pool_size: 2,
        strides: 2,
        padding: Padding::Valid,
    };
    let dense = |units, activation| Layer::Dense { units, activation };
    let dropout = Layer::Dropout { rate: 0.2 };

    let mut model = Sequential::new(Shape::Image {
        height: 32,
        width: 32,
        channels: 3,
    });
    model
        .add(conv(32))?
        .add(conv(32))?
        .add(pool)?
        .add(conv(64))?
        .add(conv(64))?
        .add(pool)?
        .add(Layer::Flatten)?
        .add(dense(128, Activation::Relu))?
        .add(dropout)?
        .add(dense(128, Activation::Relu))?
        .add(dropout)?
        .add(dense(10, Activation::Softmax))?;
    Ok(model)
}

/// Why a layer was rejected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArchitectureErrorKind {
    /// a spatial layer was given flat input
    ExpectedImageInput {
        /// the shape the layer received
        found: Shape,
    },
    /// a dense layer was given image input; add a flatten layer first
    ExpectedFlatInput {
        /// the shape the layer received
        found: Shape,
    },
    /// a `valid` window does not fit inside the input
    WindowLargerThanInput {
        /// window side length
        window: usize,
        /// input side length
        input: usize,
    },
    /// a size parameter was zero
    ZeroSized {
        /// the name of the parameter
        parameter: &'static str,
    },
    /// dropout rate outside [0, 1)
    InvalidDropoutRate(f64),
}

/// A layer that could not be added to a [`Sequential`] network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchitectureError {
    /// zero-based position the layer would have taken
    pub layer_index: usize,
    /// what was wrong with it
    pub kind: ArchitectureErrorKind,
}

impl fmt::Display for ArchitectureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "layer {}: ", self.layer_index)?;
        match self.kind {
            ArchitectureErrorKind::ExpectedImageInput { found } => {
                write!(f, "expected image input, found {}", found)
            }
            ArchitectureErrorKind::ExpectedFlatInput { found } => {
                write!(f, "expected flat input, found {}. Add a flatten layer first", found)
            }
            ArchitectureErrorKind::WindowLargerThanInput { window, input } => write!(
                f,
                "window of size {} does not fit an input of size {} without padding",
                window, input
            ),
            ArchitectureErrorKind::ZeroSized { parameter } => {
                write!(f, "{} must be at least 1", parameter)
            }
            ArchitectureErrorKind::InvalidDropoutRate(rate) => {
                write!(f, "dropout rate {} is outside [0, 1)", rate)
            }
        }
    }
}

impl std::error::Error for ArchitectureError {}
