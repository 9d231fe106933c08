//! Software attestation keys and the certificate chains that vouch for them.
//!
//! These are the well-known software attestation keys, so attestations they sign carry no
//! hardware guarantees.

use senv_common::{
    crypto::{ec, rsa, KeyMaterial},
    km_err, Error,
};
use senv_ta::device::{RetrieveCertSigningInfo, SigningAlgorithm};

/// RSA attestation private key, as a PKCS#1 `RSAPrivateKey`.
const RSA_ATTEST_KEY: &str = concat!(
    "3082025d02010002818100c08323dc56881bb8302069f5b08561c6eebe7f05e2",
    "f5a842048abe8b47be76feaef25cf29b2afa3200141601429989a15fcfc6815e",
    "b363583c2fd2f20be4983283dd814b16d7e185417ae54abc296a3a6db5c00408",
    "3b68c556c1f02339916419864d50b74d40aeca484c77356c895a0c275abfac49",
    "9d5d7d2362f29c5e02e871020301000102818100be860b0b99a802a6fb1a5943",
    "8a7bb715065b09a36dc6e9cacc6bf3c02c34d7d79e94c6606428d88c7b7f6577",
    "c1cdea64074abe8e7286df1f0811dc9728260868de95d32efc96b6d084ff271a",
    "5f60defcc703e7a38e6e29ba9a3c5fc2c28076b6a896af1d34d78828ce9bddb1",
    "f34f9c9404430781298e201316725bbdbc993a41024100e1c6d927646c0916ec",
    "36826d594983740c21f1b074c4a1a59867c669795c85d3dc464c5b929e94bfb3",
    "4e0dcc5014b10f13341ab7fdd5f60414d2a326cad41cc5024100da485997785c",
    "d5630fb0fd8c5254f98e538e18983aae9e6b7e6a5a7b5d343755b9218ebd4032",
    "0d28387d789f76fa218bcc2d8b68a5f6418fbbeca5179ab3afbd024050fefc32",
    "649559616ed6534e154509329d93a3d810dbe5bdb982292cf78bd8badb8020ae",
    "8d57f4b71d05386ffe9e9db271ca3477a34999db76f8e5ece9c0d49d024015b7",
    "4cf27cceff8bb36bf04d9d8346b09a2f70d2f4439b0f26ac7e03f7e9d1f77d4b",
    "915fd29b2823f03acb5d5200e0857ff2a803e93eee96d6235ce95442bc210241",
    "0090a745da8970b2cd649660324228c5f82856ffd665ba9a85c8d60f1b8bee71",
    "7ecd2c72eae01dad86ba7654d4cf45adb5f1f2b31d9f8122cfa5f1a5570f9b2d",
    "25",
);

/// Certificate for [`RSA_ATTEST_KEY`], issued by [`RSA_ATTEST_ROOT_CERT`].
const RSA_ATTEST_CERT: &str = concat!(
    "308202b63082021fa00302010202021000300d06092a864886f70d01010b0500",
    "3063310b30090603550406130255533113301106035504080c0a43616c69666f",
    "726e69613116301406035504070c0d4d6f756e7461696e205669657731153013",
    "060355040a0c0c476f6f676c652c20496e632e3110300e060355040b0c07416e",
    "64726f6964301e170d3136303130343132343035335a170d3335313233303132",
    "343035335a3076310b30090603550406130255533113301106035504080c0a43",
    "616c69666f726e696131153013060355040a0c0c476f6f676c652c20496e632e",
    "3110300e060355040b0c07416e64726f69643129302706035504030c20416e64",
    "726f696420536f667477617265204174746573746174696f6e204b657930819f",
    "300d06092a864886f70d010101050003818d0030818902818100c08323dc5688",
    "1bb8302069f5b08561c6eebe7f05e2f5a842048abe8b47be76feaef25cf29b2a",
    "fa3200141601429989a15fcfc6815eb363583c2fd2f20be4983283dd814b16d7",
    "e185417ae54abc296a3a6db5c004083b68c556c1f02339916419864d50b74d40",
    "aeca484c77356c895a0c275abfac499d5d7d2362f29c5e02e8710203010001a3",
    "663064301d0603551d0e04160414d40c101bf8cd63b9f73952b50e135ca6d799",
    "9386301f0603551d2304183016801429faf1accc4dd24c96402775b6b0e932e5",
    "07fe2e30120603551d130101ff040830060101ff020100300e0603551d0f0101",
    "ff040403020284300d06092a864886f70d01010b0500038181009e2d485f8c67",
    "33dc1a85ad99d75023ea14ec43b0e19deac223461e72b519dc6022e4a568316c",
    "0b55c4e69ca22d9f3a4f936b318b1678160d88cbd98bcc809d84f0c227e36b38",
    "f1fdd1e717723159357d96f3c57fab9d8f9661264fb2be81bb0d4904228ace9f",
    "f7f5422e2544fa2107125a83b555ad1882f840149b9c2063047f",
);

/// Self-signed root of the RSA attestation chain.
const RSA_ATTEST_ROOT_CERT: &str = concat!(
    "308202a730820210a003020102020900ff94d9dd9f07c80c300d06092a864886",
    "f70d01010b05003063310b30090603550406130255533113301106035504080c",
    "0a43616c69666f726e69613116301406035504070c0d4d6f756e7461696e2056",
    "69657731153013060355040a0c0c476f6f676c652c20496e632e3110300e0603",
    "55040b0c07416e64726f6964301e170d3136303130343132333130385a170d33",
    "35313233303132333130385a3063310b30090603550406130255533113301106",
    "035504080c0a43616c69666f726e69613116301406035504070c0d4d6f756e74",
    "61696e205669657731153013060355040a0c0c476f6f676c652c20496e632e31",
    "10300e060355040b0c07416e64726f696430819f300d06092a864886f70d0101",
    "01050003818d0030818902818100a26badeb6e2e4461efd50e82e6b794d17523",
    "1f779b639163fff7aaff0b72474ec02c43ec337cd7aced403e8c28a066d5f787",
    "0b3397de0eb84e1340abafa527bf9569a031db065265f844595761f0bbf2174b",
    "b7418064c0280e8f52778edbd247b645e919c8e98bc3dbc2913fd7d750c41d35",
    "66f957e497960b09acce9235859b0203010001a3633061301d0603551d0e0416",
    "041429faf1accc4dd24c96402775b6b0e932e507fe2e301f0603551d23041830",
    "16801429faf1accc4dd24c96402775b6b0e932e507fe2e300f0603551d130101",
    "ff040530030101ff300e0603551d0f0101ff040403020284300d06092a864886",
    "f70d01010b0500038181004f72f336598d0ec1b9745b3159f6f08d2549309ea3",
    "1c1c29d2452d20b94d5f64b4e880c7787a9c39dea8b3f5bf2f705f47105cc5e6",
    "eb4d069961d2ae9a07fff77cb8abeb9c0f24075eb17fba7971fd4d5b9edf14a9",
    "fedfed7cc0885df8dd9b643256d5359ae213f98fcec17cdcefa4aab255c383a9",
    "2efb5cf662f5275217be63",
);

/// EC attestation private key, as a SEC1 `ECPrivateKey` on P-256.
const EC_ATTEST_KEY: &str = concat!(
    "3077020101042021e086432a15198459cf363a50fc14c9daadf935f527c2dfd7",
    "1e4d6dbc42e544a00a06082a8648ce3d030107a14403420004eb9e79f8426359",
    "accb2a914c8986cc70ad90669382a9732613feaccbf821274c2174974a2afea5",
    "b94d7f66d4e065106635bc53b7a0a3a671583edb3e11ae1014",
);

/// Certificate for [`EC_ATTEST_KEY`], issued by [`EC_ATTEST_ROOT_CERT`].
const EC_ATTEST_CERT: &str = concat!(
    "308202783082021ea00302010202021001300a06082a8648ce3d040302308198",
    "310b30090603550406130255533113301106035504080c0a43616c69666f726e",
    "69613116301406035504070c0d4d6f756e7461696e2056696577311530130603",
    "55040a0c0c476f6f676c652c20496e632e3110300e060355040b0c07416e6472",
    "6f69643133303106035504030c2a416e64726f6964204b657973746f72652053",
    "6f667477617265204174746573746174696f6e20526f6f74301e170d31363031",
    "31313030343630395a170d3236303130383030343630395a308188310b300906",
    "03550406130255533113301106035504080c0a43616c69666f726e6961311530",
    "13060355040a0c0c476f6f676c652c20496e632e3110300e060355040b0c0741",
    "6e64726f6964313b303906035504030c32416e64726f6964204b657973746f72",
    "6520536f667477617265204174746573746174696f6e20496e7465726d656469",
    "6174653059301306072a8648ce3d020106082a8648ce3d03010703420004eb9e",
    "79f8426359accb2a914c8986cc70ad90669382a9732613feaccbf821274c2174",
    "974a2afea5b94d7f66d4e065106635bc53b7a0a3a671583edb3e11ae1014a366",
    "3064301d0603551d0e041604143ffcacd61ab13a9e8120b8d5251cc565bb1e91",
    "a9301f0603551d23041830168014c8ade9774c45c3a3cf0d1610e479433a215a",
    "30cf30120603551d130101ff040830060101ff020100300e0603551d0f0101ff",
    "040403020284300a06082a8648ce3d040302034800304502204b8a9b7bee82bc",
    "c03387ae2fc08998b4ddc38dab272a459f690cc7c392d40f8e022100eeda015d",
    "b6f432e9d4843b624c9404ef3a7cccbd5efb22bbe7feb9773f593ffb",
);

/// Self-signed root of the EC attestation chain.
const EC_ATTEST_ROOT_CERT: &str = concat!(
    "3082028b30820232a003020102020900a2059ed10e435b57300a06082a8648ce",
    "3d040302308198310b30090603550406130255533113301106035504080c0a43",
    "616c69666f726e69613116301406035504070c0d4d6f756e7461696e20566965",
    "7731153013060355040a0c0c476f6f676c652c20496e632e3110300e06035504",
    "0b0c07416e64726f69643133303106035504030c2a416e64726f6964204b6579",
    "73746f726520536f667477617265204174746573746174696f6e20526f6f7430",
    "1e170d3136303131313030343335305a170d3336303130363030343335305a30",
    "8198310b30090603550406130255533113301106035504080c0a43616c69666f",
    "726e69613116301406035504070c0d4d6f756e7461696e205669657731153013",
    "060355040a0c0c476f6f676c652c20496e632e3110300e060355040b0c07416e",
    "64726f69643133303106035504030c2a416e64726f6964204b657973746f7265",
    "20536f667477617265204174746573746174696f6e20526f6f74305930130607",
    "2a8648ce3d020106082a8648ce3d03010703420004ee5d5ec7e1c0db6d03a67e",
    "e6b61bec4d6a5d6a682e0fff7f490e7d771f44226dbdb1affa16cbc7adc577d2",
    "569caab7b02d54015d3e432b2a8ed74eec487541a4a3633061301d0603551d0e",
    "04160414c8ade9774c45c3a3cf0d1610e479433a215a30cf301f0603551d2304",
    "1830168014c8ade9774c45c3a3cf0d1610e479433a215a30cf300f0603551d13",
    "0101ff040530030101ff300e0603551d0f0101ff040403020284300a06082a86",
    "48ce3d040302034700304402203521a3ef8b34461e9cd560f31d5889206adca3",
    "6541f60d9ece8a198c6648607b02204d0bf351d9307c7d5bda35341da8471b63",
    "a585653cad4f24a7e74daf417df1bf",
);

fn decode(data: &str) -> Result<Vec<u8>, Error> {
    hex::decode(data).map_err(|e| km_err!(UnknownError, "bad attestation data: {:?}", e))
}

/// Attestation key and chain for one algorithm.
struct AlgoSignInfo {
    key: KeyMaterial,
    chain: Vec<Vec<u8>>,
}

/// The built-in software attestation keys.
pub struct SoftAttestation {
    rsa: AlgoSignInfo,
    ec: AlgoSignInfo,
}

impl SoftAttestation {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            rsa: AlgoSignInfo {
                key: KeyMaterial::Rsa(rsa::Key(decode(RSA_ATTEST_KEY)?)),
                chain: vec![decode(RSA_ATTEST_CERT)?, decode(RSA_ATTEST_ROOT_CERT)?],
            },
            ec: AlgoSignInfo {
                key: KeyMaterial::Ec(ec::Key::from_sec1(&decode(EC_ATTEST_KEY)?)?),
                chain: vec![decode(EC_ATTEST_CERT)?, decode(EC_ATTEST_ROOT_CERT)?],
            },
        })
    }

    fn info(&self, algo: SigningAlgorithm) -> &AlgoSignInfo {
        match algo {
            SigningAlgorithm::Rsa => &self.rsa,
            SigningAlgorithm::Ec => &self.ec,
        }
    }
}

impl RetrieveCertSigningInfo for SoftAttestation {
    fn signing_key(&self, algo: SigningAlgorithm) -> Result<KeyMaterial, Error> {
        Ok(self.info(algo).key.clone())
    }

    fn cert_chain(&self, algo: SigningAlgorithm) -> Result<Vec<Vec<u8>>, Error> {
        Ok(self.info(algo).chain.clone())
    }
}
