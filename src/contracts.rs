//! Bridge and oracle contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Message bridge deployed on every supported chain. Emits outbound
    /// messages as a source and executes inbound ones as a destination.
    #[sol(rpc)]
    contract MessageBridge {
        struct Message {
            uint256 nonce;
            uint256 sourceChainId;
            uint256 destChainId;
            address sender;
            address target;
            bytes payload;
            uint256 gasLimit;
            uint256 timestamp;
        }

        /// Execute a message after verifying its inclusion proof against the
        /// oracle root of `anchorBlock` on the source chain
        function executeMessage(Message calldata message, bytes32[] calldata proof, uint256 anchorBlock) external;

        /// Execute a message on the authority of the caller alone
        function executeMessageTrusted(Message calldata message) external;

        /// 0 = unknown, 1 = executed, 2 = failed
        function messageStatus(uint256 sourceChainId, uint256 nonce) external view returns (uint8);

        event MessageSent(
            uint256 indexed nonce,
            uint256 indexed destChainId,
            address indexed sender,
            address target,
            bytes payload,
            uint256 gasLimit,
            uint256 timestamp
        );

        event MessageExecuted(
            uint256 indexed sourceChainId,
            uint256 indexed nonce,
            bytes32 messageHash
        );

        event MessageFailed(
            uint256 indexed sourceChainId,
            uint256 indexed nonce,
            bytes32 messageHash
        );
    }
}

sol! {
    /// Oracle holding finalized message roots per source chain and block
    #[sol(rpc)]
    contract StateOracle {
        function isFinalized(uint256 chainId, uint256 blockNumber) external view returns (bool);

        function stateRoot(uint256 chainId, uint256 blockNumber) external view returns (bytes32);
    }
}
