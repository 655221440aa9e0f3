pub mod aesgcmkw;
pub mod aeskw;
pub mod direct;
pub mod ecdh_es;
pub mod ecdh_es_aeskw;
pub mod pbes2_hmac_aeskw;
pub mod rsaes;

pub use crate::jwe::alg::aesgcmkw::AesgcmkwJweAlgorithm;
pub use crate::jwe::alg::aeskw::AeskwJweAlgorithm;
pub use crate::jwe::alg::direct::DirectJweAlgorithm;
pub use crate::jwe::alg::ecdh_es::EcdhEsJweAlgorithm;
pub use crate::jwe::alg::ecdh_es_aeskw::EcdhEsAeskwJweAlgorithm;
pub use crate::jwe::alg::pbes2_hmac_aeskw::Pbes2HmacAeskwJweAlgorithm;
pub use crate::jwe::alg::rsaes::RsaesJweAlgorithm;
