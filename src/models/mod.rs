//! Architecture generators built on top of the graph container.

mod chains;
mod resnet;
mod vgg;

pub use chains::{build_alex_net, build_le_net, build_mnist_tutorial_net, build_one_layer_net};
pub use resnet::{build_cifar_resnet, build_imagenet_resnet, BlockType, ResNetConfig};
pub use vgg::{build_vgg_net, VggConfig};
