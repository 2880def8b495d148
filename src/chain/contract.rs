//! Minimal wrapped-native-asset ABI (WETH9 style)

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::abigen;
use ethers::types::{Address, Bytes, U256};

use crate::error::{CyclerError, CyclerResult};

abigen!(
    WrappedNative,
    r#"[
        function deposit() payable
        function withdraw(uint256 wad)
        function balanceOf(address account) view returns (uint256)
    ]"#
);

pub fn deposit_calldata() -> Bytes {
    DepositCall::default().encode().into()
}

pub fn withdraw_calldata(wad: U256) -> Bytes {
    WithdrawCall { wad }.encode().into()
}

pub fn balance_of_calldata(account: Address) -> Bytes {
    BalanceOfCall { account }.encode().into()
}

pub fn decode_balance(output: &Bytes) -> CyclerResult<U256> {
    U256::decode(output.as_ref())
        .map_err(|e| CyclerError::Contract(format!("Invalid balanceOf output: {}", e)))
}
