// input parameters
pub const IMAGE_CHANNELS: i64 = 3;

// hyper-parameters: descriptor
pub const DES_CONV1_CHANNELS: i64 = 64;
pub const DES_CONV2_CHANNELS: i64 = 128;
pub const DES_CONV3_CHANNELS: i64 = 256;
pub const DES_FEATURES: i64 = 100; // width of the final fully connected layer

// hyper-parameters: generator
pub const GEN_CONVT1_CHANNELS: i64 = 512;
pub const GEN_CONVT2_CHANNELS: i64 = 256;
pub const GEN_CONVT3_CHANNELS: i64 = 128;
pub const GEN_CONVT4_CHANNELS: i64 = 64;
pub const GEN_KERNEL_SIZE: i64 = 5;
pub const GEN_BATCH_NORM_EPS: f64 = 1e-3;

// activations
pub const LEAKY_RELU_SLOPE: f64 = 0.2;
